//! Corporate tax prepayments (voorafbetalingen) per quarter.
//!
//! Reports, for every company reconciled in a year, which quarterly
//! prepayments were made according to its latest reconciled period.

use chrono::NaiveDate;
use ledger_core::{LedgerError, PrepaymentRecord};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub const PREPAYMENT_YEARS: RangeInclusive<i32> = 2000..=2099;

pub fn validate_prepayment_year(year: i32) -> Result<i32, LedgerError> {
    if PREPAYMENT_YEARS.contains(&year) {
        Ok(year)
    } else {
        Err(LedgerError::InvalidInput(format!(
            "year must be between {} and {}, got {}",
            PREPAYMENT_YEARS.start(),
            PREPAYMENT_YEARS.end(),
            year
        )))
    }
}

/// Quarter to report on; 0 selects all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PrepaymentTerm(u8);

impl PrepaymentTerm {
    pub const ALL: PrepaymentTerm = PrepaymentTerm(0);

    pub fn new(term: i64) -> Result<Self, LedgerError> {
        match term {
            0..=4 => Ok(PrepaymentTerm(term as u8)),
            other => Err(LedgerError::InvalidInput(format!(
                "term must be 1, 2, 3 or 4 (0 for all), got {}",
                other
            ))),
        }
    }

    pub fn quarters(&self) -> RangeInclusive<u8> {
        match self.0 {
            0 => 1..=4,
            q => q..=q,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuarterStatus {
    pub quarter: u8,
    pub made: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrepaymentStatus {
    pub company_id: i64,
    pub name: String,
    pub period_id: i64,
    pub end_date: NaiveDate,
    pub quarters: Vec<QuarterStatus>,
}

impl PrepaymentStatus {
    pub fn project(record: &PrepaymentRecord, term: PrepaymentTerm) -> Self {
        let quarters = term
            .quarters()
            .map(|quarter| QuarterStatus {
                quarter,
                made: record.made[usize::from(quarter - 1)],
            })
            .collect();

        Self {
            company_id: record.company.company_id,
            name: record.company.name.clone(),
            period_id: record.period_id,
            end_date: record.end_date,
            quarters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrepaymentReport {
    pub year: i32,
    pub term: PrepaymentTerm,
    pub companies: Vec<PrepaymentStatus>,
    /// Companies whose reconciliation data could not be read
    pub excluded: Vec<i64>,
}

/// Latest reconciled period per company: latest end date, then lowest period id.
pub fn latest_records(records: Vec<PrepaymentRecord>) -> BTreeMap<i64, PrepaymentRecord> {
    let key = |r: &PrepaymentRecord| (Reverse(r.end_date), r.period_id);
    let mut latest: BTreeMap<i64, PrepaymentRecord> = BTreeMap::new();

    for record in records {
        let company_id = record.company.company_id;
        let better = match latest.get(&company_id) {
            Some(current) => key(&record) < key(current),
            None => true,
        };
        if better {
            latest.insert(company_id, record);
        }
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::Company;

    fn record(company_id: i64, period_id: i64, end: NaiveDate, made: [Option<bool>; 4]) -> PrepaymentRecord {
        PrepaymentRecord {
            company: Company {
                company_id,
                name: format!("Company {}", company_id),
            },
            period_id,
            end_date: end,
            made,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_term_and_year_bounds() {
        assert_eq!(PrepaymentTerm::new(0).unwrap(), PrepaymentTerm::ALL);
        assert_eq!(PrepaymentTerm::new(3).unwrap().quarters(), 3..=3);
        for bad in [-1, 5, 12] {
            assert!(matches!(PrepaymentTerm::new(bad), Err(LedgerError::InvalidInput(_))));
        }

        assert!(validate_prepayment_year(2000).is_ok());
        assert!(validate_prepayment_year(2099).is_ok());
        assert!(validate_prepayment_year(1999).is_err());
        assert!(validate_prepayment_year(2100).is_err());
    }

    #[test]
    fn test_latest_period_wins() {
        let records = vec![
            record(1, 10, date(2023, 6, 30), [Some(true), None, None, None]),
            record(1, 11, date(2023, 12, 31), [Some(true), Some(true), Some(false), None]),
            record(2, 20, date(2023, 12, 31), [None; 4]),
        ];
        let latest = latest_records(records);

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&1].period_id, 11);
    }

    #[test]
    fn test_projection_by_term() {
        let r = record(1, 11, date(2023, 12, 31), [Some(true), Some(true), Some(false), None]);

        let q3 = PrepaymentStatus::project(&r, PrepaymentTerm::new(3).unwrap());
        assert_eq!(q3.quarters, vec![QuarterStatus { quarter: 3, made: Some(false) }]);

        let all = PrepaymentStatus::project(&r, PrepaymentTerm::ALL);
        let made: Vec<Option<bool>> = all.quarters.iter().map(|q| q.made).collect();
        assert_eq!(made, vec![Some(true), Some(true), Some(false), None]);
    }
}
