//! Metric Catalog
//!
//! The fixed set of financial metrics the engine knows how to compute. Each
//! metric carries its rule as plain data: which account-number prefixes it
//! reads, how the sums are signed and how they are combined.

use ledger_core::{AccountFilter, AccountType, LedgerError};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Belgian chart of accounts (MAR/PCMN) prefix groups.
const EBITDA_ACCOUNTS: &[&str] = &["60", "61", "62", "64", "70", "71", "72", "73", "74"];
const RESULT_ACCOUNTS: &[&str] = &[
    "60", "61", "62", "63", "64", "65", "66", "67", "68", "70", "71", "72", "73", "74", "75", "76",
    "77", "78",
];
const OPERATING_ACCOUNTS: &[&str] = &["60", "61", "62", "63", "64", "70", "71", "72", "73", "74"];
const EQUITY_ACCOUNTS: &[&str] = &["10", "11", "12", "13", "14", "15"];
const PROVISION_ACCOUNTS: &[&str] = &["16"];
const FINANCIAL_DEBT_ACCOUNTS: &[&str] = &["16", "17", "42", "43"];
const CASH_ACCOUNTS: &[&str] = &["50", "51", "52", "53", "54", "55", "56", "57", "58"];
const STOCK_AND_RECEIVABLE_ACCOUNTS: &[&str] =
    &["30", "31", "32", "33", "34", "35", "36", "37", "40"];
const TRADE_PAYABLE_ACCOUNTS: &[&str] = &["44"];
const GROSS_MARGIN_INCOME_ACCOUNTS: &[&str] = &["70", "71", "72", "74"];
const PURCHASE_ACCOUNTS: &[&str] = &["60"];
const REVENUE_ACCOUNTS: &[&str] = &["70"];
const DEPRECIATION_ACCOUNTS: &[&str] = &["63"];
const TRADE_RECEIVABLE_ACCOUNTS: &[&str] = &["40"];

const DAYS_PER_YEAR: i64 = 365;

/// How a raw ledger sum is turned into a business figure.
///
/// Ledger values follow the accounting sign convention (credits negative),
/// so most reported figures are the negated sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Negate,
    Keep,
}

impl Sign {
    pub fn apply(self, value: Decimal) -> Decimal {
        match self {
            Sign::Negate => -value,
            Sign::Keep => value,
        }
    }
}

/// A signed sum over the ledger lines selected by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Term {
    pub filter: AccountFilter,
    pub sign: Sign,
}

impl Term {
    const fn negated(prefixes: &'static [&'static str]) -> Self {
        Self {
            filter: AccountFilter::Prefixes(prefixes),
            sign: Sign::Negate,
        }
    }

    const fn raw(prefixes: &'static [&'static str]) -> Self {
        Self {
            filter: AccountFilter::Prefixes(prefixes),
            sign: Sign::Keep,
        }
    }
}

/// How a metric combines its sums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricRule {
    Sum(Term),
    /// Each operand is signed on its own before subtracting.
    Difference { plus: Term, minus: Term },
    /// Raw numerator sum over raw denominator sum, times `scale`.
    Ratio {
        numerator: AccountFilter,
        denominator: AccountFilter,
        absolute: bool,
        scale: i64,
    },
}

impl MetricRule {
    /// Every filter the rule reads, in evaluation order.
    pub fn filters(&self) -> Vec<AccountFilter> {
        match self {
            MetricRule::Sum(term) => vec![term.filter],
            MetricRule::Difference { plus, minus } => vec![plus.filter, minus.filter],
            MetricRule::Ratio {
                numerator,
                denominator,
                ..
            } => vec![*numerator, *denominator],
        }
    }

    pub fn is_ratio(&self) -> bool {
        matches!(self, MetricRule::Ratio { .. })
    }
}

/// Supported financial metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Ebitda,
    Verlies,
    Balanstotaal,
    EigenVermogen,
    Voorzieningen,
    Handelswerkkapitaal,
    FinancieleSchulden,
    LiquideMiddelen,
    BrutoMarge,
    Omzet,
    EbitdaMarge,
    Afschrijvingen,
    Ebit,
    NettoFinancieleSchuld,
    Handelsvorderingen,
    Dso,
}

impl Metric {
    pub const ALL: [Metric; 16] = [
        Metric::Ebitda,
        Metric::Verlies,
        Metric::Balanstotaal,
        Metric::EigenVermogen,
        Metric::Voorzieningen,
        Metric::Handelswerkkapitaal,
        Metric::FinancieleSchulden,
        Metric::LiquideMiddelen,
        Metric::BrutoMarge,
        Metric::Omzet,
        Metric::EbitdaMarge,
        Metric::Afschrijvingen,
        Metric::Ebit,
        Metric::NettoFinancieleSchuld,
        Metric::Handelsvorderingen,
        Metric::Dso,
    ];

    /// Canonical name, matched exactly by [`Metric::lookup`].
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Ebitda => "EBITDA",
            Metric::Verlies => "Verlies",
            Metric::Balanstotaal => "Balanstotaal",
            Metric::EigenVermogen => "Eigen vermogen",
            Metric::Voorzieningen => "Voorzieningen",
            Metric::Handelswerkkapitaal => "Handelswerkkapitaal",
            Metric::FinancieleSchulden => "Financiële schulden",
            Metric::LiquideMiddelen => "Liquide middelen",
            Metric::BrutoMarge => "Bruto marge",
            Metric::Omzet => "Omzet",
            Metric::EbitdaMarge => "EBITDA marge",
            Metric::Afschrijvingen => "Afschrijvingen",
            Metric::Ebit => "EBIT",
            Metric::NettoFinancieleSchuld => "Netto financiële schuld",
            Metric::Handelsvorderingen => "Handelsvorderingen",
            Metric::Dso => "DSO",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Metric::Ebitda => "Earnings before interest, taxes, depreciation and amortization",
            Metric::Verlies => "Net result of all income and expense accounts",
            Metric::Balanstotaal => "Total of all asset accounts",
            Metric::EigenVermogen => "Equity: capital, reserves and retained earnings",
            Metric::Voorzieningen => "Provisions for liabilities and charges",
            Metric::Handelswerkkapitaal => {
                "Trade working capital: inventories and trade receivables less trade payables"
            }
            Metric::FinancieleSchulden => "Financial debt, long and short term",
            Metric::LiquideMiddelen => "Cash, cash equivalents and short-term investments",
            Metric::BrutoMarge => "Gross margin: operating income less purchases of goods",
            Metric::Omzet => "Revenue from sales and services",
            Metric::EbitdaMarge => "EBITDA as a fraction of revenue",
            Metric::Afschrijvingen => "Depreciation and amortization",
            Metric::Ebit => "Earnings before interest and taxes",
            Metric::NettoFinancieleSchuld => "Financial debt less cash",
            Metric::Handelsvorderingen => "Outstanding trade receivables",
            Metric::Dso => "Days sales outstanding: average collection period in days",
        }
    }

    pub fn rule(&self) -> MetricRule {
        match self {
            Metric::Ebitda => MetricRule::Sum(Term::negated(EBITDA_ACCOUNTS)),
            Metric::Verlies => MetricRule::Sum(Term::negated(RESULT_ACCOUNTS)),
            Metric::Balanstotaal => MetricRule::Sum(Term {
                filter: AccountFilter::Type(AccountType::Asset),
                sign: Sign::Negate,
            }),
            Metric::EigenVermogen => MetricRule::Sum(Term::negated(EQUITY_ACCOUNTS)),
            Metric::Voorzieningen => MetricRule::Sum(Term::negated(PROVISION_ACCOUNTS)),
            Metric::Handelswerkkapitaal => MetricRule::Difference {
                plus: Term::raw(STOCK_AND_RECEIVABLE_ACCOUNTS),
                minus: Term::raw(TRADE_PAYABLE_ACCOUNTS),
            },
            Metric::FinancieleSchulden => MetricRule::Sum(Term::negated(FINANCIAL_DEBT_ACCOUNTS)),
            Metric::LiquideMiddelen => MetricRule::Sum(Term::negated(CASH_ACCOUNTS)),
            Metric::BrutoMarge => MetricRule::Difference {
                plus: Term::raw(GROSS_MARGIN_INCOME_ACCOUNTS),
                minus: Term::raw(PURCHASE_ACCOUNTS),
            },
            Metric::Omzet => MetricRule::Sum(Term::negated(REVENUE_ACCOUNTS)),
            Metric::EbitdaMarge => MetricRule::Ratio {
                numerator: AccountFilter::Prefixes(EBITDA_ACCOUNTS),
                denominator: AccountFilter::Prefixes(REVENUE_ACCOUNTS),
                absolute: false,
                scale: 1,
            },
            Metric::Afschrijvingen => MetricRule::Sum(Term::negated(DEPRECIATION_ACCOUNTS)),
            // EBITDA minus depreciation, in one pass over the operating accounts.
            Metric::Ebit => MetricRule::Sum(Term::negated(OPERATING_ACCOUNTS)),
            Metric::NettoFinancieleSchuld => MetricRule::Difference {
                plus: Term::negated(FINANCIAL_DEBT_ACCOUNTS),
                minus: Term::negated(CASH_ACCOUNTS),
            },
            Metric::Handelsvorderingen => MetricRule::Sum(Term::negated(TRADE_RECEIVABLE_ACCOUNTS)),
            Metric::Dso => MetricRule::Ratio {
                numerator: AccountFilter::Prefixes(TRADE_RECEIVABLE_ACCOUNTS),
                denominator: AccountFilter::Prefixes(REVENUE_ACCOUNTS),
                absolute: true,
                scale: DAYS_PER_YEAR,
            },
        }
    }

    /// Exact, case-sensitive lookup by canonical name.
    pub fn lookup(name: &str) -> Result<Metric, LedgerError> {
        Metric::ALL
            .iter()
            .copied()
            .find(|metric| metric.name() == name)
            .ok_or_else(|| LedgerError::UnknownMetric {
                name: name.to_string(),
                supported: Metric::names(),
            })
    }

    pub fn names() -> Vec<String> {
        Metric::ALL.iter().map(|m| m.name().to_string()).collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::lookup(s)
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Catalog entry as shown to callers listing the available metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub rule: MetricRule,
}

pub fn supported_metrics() -> Vec<MetricInfo> {
    Metric::ALL
        .iter()
        .map(|metric| MetricInfo {
            name: metric.name(),
            description: metric.description(),
            rule: metric.rule(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_exact() {
        assert_eq!(Metric::lookup("EBITDA").unwrap(), Metric::Ebitda);
        assert_eq!(Metric::lookup("EBITDA marge").unwrap(), Metric::EbitdaMarge);
        assert_eq!(
            Metric::lookup("Netto financiële schuld").unwrap(),
            Metric::NettoFinancieleSchuld
        );
        assert!(Metric::lookup("ebitda").is_err());
        assert!(Metric::lookup(" EBITDA").is_err());
    }

    #[test]
    fn test_unknown_metric_enumerates_catalog() {
        match Metric::lookup("winst") {
            Err(LedgerError::UnknownMetric { name, supported }) => {
                assert_eq!(name, "winst");
                assert_eq!(supported.len(), 16);
                assert!(supported.contains(&"DSO".to_string()));
            }
            other => panic!("expected UnknownMetric, got {:?}", other),
        }
    }

    #[test]
    fn test_names_are_unique_and_round_trip() {
        let names = Metric::names();
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());

        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
    }

    #[test]
    fn test_ratio_metrics() {
        let ratios: Vec<Metric> = Metric::ALL
            .iter()
            .copied()
            .filter(|m| m.rule().is_ratio())
            .collect();
        assert_eq!(ratios, vec![Metric::EbitdaMarge, Metric::Dso]);

        match Metric::Dso.rule() {
            MetricRule::Ratio { absolute, scale, .. } => {
                assert!(absolute);
                assert_eq!(scale, 365);
            }
            other => panic!("unexpected rule {:?}", other),
        }
    }

    #[test]
    fn test_ebit_covers_ebitda_and_depreciation() {
        let MetricRule::Sum(ebit) = Metric::Ebit.rule() else {
            panic!("EBIT should be a single sum");
        };
        let AccountFilter::Prefixes(prefixes) = ebit.filter else {
            panic!("EBIT should select by prefix");
        };
        for p in EBITDA_ACCOUNTS.iter().chain(DEPRECIATION_ACCOUNTS) {
            assert!(prefixes.contains(p), "missing prefix {}", p);
        }
        assert_eq!(prefixes.len(), EBITDA_ACCOUNTS.len() + DEPRECIATION_ACCOUNTS.len());
    }

    #[test]
    fn test_balance_total_selects_assets() {
        assert_eq!(
            Metric::Balanstotaal.rule().filters(),
            vec![AccountFilter::Type(AccountType::Asset)]
        );
    }

    #[test]
    fn test_supported_metrics_serialize() {
        let json = serde_json::to_value(supported_metrics()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 16);
        assert_eq!(json[0]["name"], "EBITDA");
        assert_eq!(json[0]["rule"]["kind"], "sum");
    }
}
