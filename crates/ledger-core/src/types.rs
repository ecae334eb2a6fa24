use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::LedgerError;

/// Company as registered in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: i64,
    pub name: String,
}

/// Closed accounting period of one company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub period_id: i64,
    pub company_id: i64,
    pub end_date: NaiveDate,
    pub fiscal_year_end: NaiveDate,
}

impl Period {
    /// The authoritative annual period: it closes on the fiscal year end.
    pub fn is_fiscal_year_end(&self) -> bool {
        self.end_date == self.fiscal_year_end
    }

    pub fn year(&self) -> i32 {
        self.end_date.year()
    }
}

/// Period joined with the company that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyPeriod {
    pub company: Company,
    pub period: Period,
}

/// Ledger account classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Income,
    Expense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "income" => Ok(AccountType::Income),
            "expense" => Ok(AccountType::Expense),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown account type '{}'",
                other
            ))),
        }
    }
}

/// One ledger line: the signed balance of an account for a (company, period)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetail {
    pub company_id: i64,
    pub period_id: i64,
    pub account_number: String,
    pub account_type: Option<AccountType>,
    pub value: Decimal,
}

/// Selects ledger lines by account number prefix or by account type.
///
/// The same filter is matched in-process by the metric engine and rendered
/// into a query predicate by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountFilter {
    Prefixes(&'static [&'static str]),
    Type(AccountType),
}

impl AccountFilter {
    pub fn matches(&self, detail: &AccountDetail) -> bool {
        match self {
            AccountFilter::Prefixes(prefixes) => prefixes
                .iter()
                .any(|p| detail.account_number.starts_with(p)),
            AccountFilter::Type(account_type) => detail.account_type == Some(*account_type),
        }
    }
}

/// Sort direction for rankings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(LedgerError::InvalidInput(format!(
                "order must be ASC or DESC, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "ASC"),
            SortOrder::Descending => write!(f, "DESC"),
        }
    }
}

/// Selects ledger lines for a plain listing: by company, by period, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSelector {
    pub company_id: Option<i64>,
    pub period_id: Option<i64>,
}

impl LineSelector {
    pub fn new(company_id: Option<i64>, period_id: Option<i64>) -> Result<Self, LedgerError> {
        if company_id.is_none() && period_id.is_none() {
            return Err(LedgerError::InvalidInput(
                "give a company id, a period id or both".to_string(),
            ));
        }
        Ok(Self {
            company_id,
            period_id,
        })
    }

    pub fn matches(&self, detail: &AccountDetail) -> bool {
        self.company_id.map_or(true, |c| c == detail.company_id)
            && self.period_id.map_or(true, |p| p == detail.period_id)
    }
}

/// Rows fetched for many companies in one query.
///
/// A company with any unreadable row is listed in `rejected` and has no
/// rows at all in `rows`, so callers never work from a partial picture.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyBatch<T> {
    pub rows: Vec<T>,
    pub rejected: BTreeMap<i64, LedgerError>,
}

impl<T> CompanyBatch<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self {
            rows,
            rejected: BTreeMap::new(),
        }
    }

    /// Build a batch from per-row conversion results keyed by company id.
    ///
    /// The first error seen for a company is the one kept.
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (i64, Result<T, LedgerError>)>,
    {
        let mut accepted = Vec::new();
        let mut rejected = BTreeMap::new();

        for (company_id, result) in results {
            match result {
                Ok(row) => accepted.push((company_id, row)),
                Err(e) => {
                    rejected.entry(company_id).or_insert(e);
                }
            }
        }

        let rows = accepted
            .into_iter()
            .filter(|(company_id, _)| !rejected.contains_key(company_id))
            .map(|(_, row)| row)
            .collect();

        Self { rows, rejected }
    }
}

/// Quarterly corporate tax prepayment flags recorded by a period's reconciliation.
///
/// `made[0]` is the first quarter. `None` means nothing was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepaymentRecord {
    pub company: Company,
    pub period_id: i64,
    pub end_date: NaiveDate,
    pub made: [Option<bool>; 4],
}

/// Reconciliation record tied to a ledger period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub reconciliation_id: i64,
    pub name: String,
}

/// Parse an ISO `YYYY-MM-DD` date supplied by a caller.
pub fn parse_iso_date(input: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        LedgerError::InvalidInput(format!(
            "date must be in YYYY-MM-DD format, got '{}'",
            input
        ))
    })
}

/// First and last day of a calendar year.
pub fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), LedgerError> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1);
    let last = NaiveDate::from_ymd_opt(year, 12, 31);
    match (first, last) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(LedgerError::InvalidInput(format!(
            "year {} is out of range",
            year
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn detail(account_number: &str, account_type: Option<AccountType>) -> AccountDetail {
        AccountDetail {
            company_id: 1,
            period_id: 1,
            account_number: account_number.to_string(),
            account_type,
            value: dec!(1),
        }
    }

    #[test]
    fn test_prefix_filter_is_starts_with() {
        let filter = AccountFilter::Prefixes(&["60", "70"]);
        assert!(filter.matches(&detail("600000", None)));
        assert!(filter.matches(&detail("70", None)));
        assert!(!filter.matches(&detail("160", None)));
        assert!(!filter.matches(&detail("6", None)));
    }

    #[test]
    fn test_type_filter() {
        let filter = AccountFilter::Type(AccountType::Asset);
        assert!(filter.matches(&detail("220000", Some(AccountType::Asset))));
        assert!(!filter.matches(&detail("220000", Some(AccountType::Liability))));
        assert!(!filter.matches(&detail("220000", None)));
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert_eq!(" Descending ".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!(matches!(
            "sideways".parse::<SortOrder>(),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sort_order_defaults_to_descending() {
        assert_eq!(SortOrder::default(), SortOrder::Descending);
    }

    #[test]
    fn test_line_selector() {
        assert!(matches!(
            LineSelector::new(None, None),
            Err(LedgerError::InvalidInput(_))
        ));

        let by_company = LineSelector::new(Some(1), None).unwrap();
        assert!(by_company.matches(&detail("700000", None)));

        let both = LineSelector::new(Some(1), Some(2)).unwrap();
        assert!(!both.matches(&detail("700000", None)));
    }

    #[test]
    fn test_batch_drops_every_row_of_a_rejected_company() {
        let bad = LedgerError::DataSource("invalid decimal value 'n/a'".to_string());
        let batch = CompanyBatch::from_results(vec![
            (1, Ok("1a")),
            (2, Ok("2a")),
            (2, Err(bad.clone())),
            (3, Ok("3a")),
            (2, Ok("2b")),
        ]);

        assert_eq!(batch.rows, vec!["1a", "3a"]);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected.get(&2), Some(&bad));
    }

    #[test]
    fn test_parse_iso_date() {
        let date = parse_iso_date("2023-12-31").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(parse_iso_date("31/12/2023").is_err());
        assert!(parse_iso_date("2023-02-30").is_err());
    }

    #[test]
    fn test_fiscal_year_end_period() {
        let period = Period {
            period_id: 7,
            company_id: 1,
            end_date: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
            fiscal_year_end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        };
        assert!(!period.is_fiscal_year_end());
        assert_eq!(period.year(), 2023);
    }
}
