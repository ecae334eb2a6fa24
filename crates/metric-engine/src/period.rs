//! Period Resolver
//!
//! Picks the ledger period that represents a company's figures for a year.
//! The fiscal-year-end period wins; otherwise the latest period of the year.

use chrono::{Datelike, NaiveDate};
use ledger_core::{parse_iso_date, CompanyPeriod, LedgerError, LedgerSource, Period};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 1 for the fiscal-year-end period of `year`, 2 for anything else.
fn priority(period: &Period, year: i32) -> u8 {
    if period.is_fiscal_year_end() && period.fiscal_year_end.year() == year {
        1
    } else {
        2
    }
}

/// Sort key: priority, then latest end date, then lowest id.
fn rank_key(period: &Period, year: i32) -> (u8, Reverse<NaiveDate>, i64) {
    (priority(period, year), Reverse(period.end_date), period.period_id)
}

/// Select the primary period for `year` among one company's periods.
///
/// Periods ending outside `year` are ignored.
pub fn select_primary_period<'a, I>(periods: I, year: i32) -> Option<&'a Period>
where
    I: IntoIterator<Item = &'a Period>,
{
    periods
        .into_iter()
        .filter(|p| p.year() == year)
        .min_by_key(|p| rank_key(p, year))
}

/// Batch variant: one primary period per company.
///
/// Companies with no period in `year` are absent from the result.
pub fn primary_periods(candidates: Vec<CompanyPeriod>, year: i32) -> BTreeMap<i64, CompanyPeriod> {
    let mut primary: BTreeMap<i64, CompanyPeriod> = BTreeMap::new();

    for candidate in candidates {
        if candidate.period.year() != year {
            continue;
        }

        let company_id = candidate.period.company_id;
        let better = match primary.get(&company_id) {
            Some(current) => rank_key(&candidate.period, year) < rank_key(&current.period, year),
            None => true,
        };
        if better {
            primary.insert(company_id, candidate);
        }
    }

    primary
}

pub struct PeriodResolver<S> {
    source: Arc<S>,
}

impl<S: LedgerSource> PeriodResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Resolve the primary period of `company_id` for the year of `date`.
    pub async fn resolve(&self, company_id: i64, date: NaiveDate) -> Result<Period, LedgerError> {
        self.resolve_year(company_id, date.year()).await
    }

    /// Same as [`PeriodResolver::resolve`] with an ISO `YYYY-MM-DD` date.
    ///
    /// A malformed date is rejected before the ledger is queried.
    pub async fn resolve_str(&self, company_id: i64, date: &str) -> Result<Period, LedgerError> {
        let date = parse_iso_date(date)?;
        self.resolve(company_id, date).await
    }

    pub async fn resolve_year(&self, company_id: i64, year: i32) -> Result<Period, LedgerError> {
        let periods = self.source.periods_in_year(company_id, year).await?;

        let period = select_primary_period(&periods, year)
            .cloned()
            .ok_or(LedgerError::NoPeriodFound { company_id, year })?;

        tracing::debug!(
            company_id,
            year,
            period_id = period.period_id,
            candidates = periods.len(),
            "resolved primary period"
        );

        Ok(period)
    }
}
