//! Corporate tax rate lookups on reconciled periods.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Belgian corporate tax brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBracket {
    /// 20% SME rate
    Reduced,
    /// 25% standard rate
    Standard,
    Other,
}

impl TaxBracket {
    pub fn classify(percentage: Decimal) -> Self {
        if percentage == Decimal::from(20) {
            TaxBracket::Reduced
        } else if percentage == Decimal::from(25) {
            TaxBracket::Standard
        } else {
            TaxBracket::Other
        }
    }
}

/// Some ledgers store the rate as a fraction (0.25); report it in percent.
pub fn normalize_percentage(raw: Decimal) -> Decimal {
    if raw > Decimal::ZERO && raw <= Decimal::ONE {
        (raw * Decimal::ONE_HUNDRED).normalize()
    } else {
        raw.normalize()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxRate {
    pub company_id: i64,
    pub period_id: i64,
    pub end_date: NaiveDate,
    pub percentage: Decimal,
    pub bracket: TaxBracket,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxRateChange {
    pub current: TaxRate,
    pub previous: Option<TaxRate>,
    pub decreased: bool,
}

impl TaxRateChange {
    pub fn new(current: TaxRate, previous: Option<TaxRate>) -> Self {
        let decreased = previous
            .as_ref()
            .is_some_and(|prev| current.percentage < prev.percentage);
        Self {
            current,
            previous,
            decreased,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rate(percentage: Decimal) -> TaxRate {
        TaxRate {
            company_id: 1,
            period_id: 1,
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            percentage,
            bracket: TaxBracket::classify(percentage),
        }
    }

    #[test]
    fn test_bracket_classification() {
        assert_eq!(TaxBracket::classify(dec!(20)), TaxBracket::Reduced);
        assert_eq!(TaxBracket::classify(dec!(25.00)), TaxBracket::Standard);
        assert_eq!(TaxBracket::classify(dec!(29.58)), TaxBracket::Other);
    }

    #[test]
    fn test_fraction_rates_normalized() {
        assert_eq!(normalize_percentage(dec!(0.25)), dec!(25));
        assert_eq!(normalize_percentage(dec!(20)), dec!(20));
        assert_eq!(normalize_percentage(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_decrease_requires_previous_year() {
        assert!(TaxRateChange::new(rate(dec!(20)), Some(rate(dec!(25)))).decreased);
        assert!(!TaxRateChange::new(rate(dec!(25)), Some(rate(dec!(20)))).decreased);
        assert!(!TaxRateChange::new(rate(dec!(20)), None).decreased);
    }
}
