//! Cross-Company Ranking Engine
//!
//! Ranks every company by a metric for one fiscal year. Each company is
//! valued on its primary period for that year; all ledger lines are fetched
//! in one batch and combined per company in-process.

use ledger_core::{AccountDetail, LedgerError, LedgerSource, SortOrder};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::Metric;
use crate::compute::evaluate;
use crate::period::primary_periods;

/// Largest number of companies a single ranking may return.
pub const MAX_RANKING_LIMIT: i64 = 100;

/// A validated ranking request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankingRequest {
    pub metric: Metric,
    pub fiscal_year: i32,
    pub limit: usize,
    pub order: SortOrder,
}

impl RankingRequest {
    /// Validate a request. Limits outside `1..=100` are rejected, not clamped.
    pub fn new(
        metric: Metric,
        fiscal_year: i32,
        limit: i64,
        order: SortOrder,
    ) -> Result<Self, LedgerError> {
        if limit <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "limit must be a positive number, got {}",
                limit
            )));
        }
        if limit > MAX_RANKING_LIMIT {
            return Err(LedgerError::InvalidInput(format!(
                "limit {} is too large; at most {} companies can be compared",
                limit, MAX_RANKING_LIMIT
            )));
        }

        Ok(Self {
            metric,
            fiscal_year,
            limit: limit as usize,
            order,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCompany {
    pub company_id: i64,
    pub name: String,
    pub period_id: i64,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingResult {
    pub metric: Metric,
    pub fiscal_year: i32,
    pub order: SortOrder,
    pub companies: Vec<RankedCompany>,
}

/// Sort by value in `order`, equal values by company id ascending, then truncate.
pub fn order_ranking(mut companies: Vec<RankedCompany>, order: SortOrder, limit: usize) -> Vec<RankedCompany> {
    companies.sort_by(|a, b| {
        let by_value = match order {
            SortOrder::Ascending => a.value.cmp(&b.value),
            SortOrder::Descending => b.value.cmp(&a.value),
        };
        by_value.then_with(|| a.company_id.cmp(&b.company_id))
    });
    companies.truncate(limit);
    companies
}

pub struct RankingEngine<S> {
    source: Arc<S>,
}

impl<S: LedgerSource> RankingEngine<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub async fn rank(&self, request: &RankingRequest) -> Result<RankingResult, LedgerError> {
        let metric = request.metric;
        let year = request.fiscal_year;

        let candidates = self.source.all_periods_in_year(year).await?;
        let mut unreadable = candidates.rejected;
        let primary = primary_periods(candidates.rows, year);

        let mut ranked = Vec::with_capacity(primary.len());

        if !primary.is_empty() {
            let periods: Vec<_> = primary.values().map(|cp| cp.period.clone()).collect();
            let filters = metric.rule().filters();
            let batch = self
                .source
                .account_details_for_periods(&periods, &filters)
                .await?;

            tracing::debug!(
                metric = metric.name(),
                year,
                companies = primary.len(),
                lines = batch.rows.len(),
                "batched ranking fetch"
            );

            unreadable.extend(batch.rejected);

            let mut by_company: BTreeMap<i64, Vec<AccountDetail>> = BTreeMap::new();
            for detail in batch.rows {
                let belongs = primary
                    .get(&detail.company_id)
                    .is_some_and(|cp| cp.period.period_id == detail.period_id);
                if belongs {
                    by_company.entry(detail.company_id).or_default().push(detail);
                }
            }

            for (company_id, cp) in &primary {
                if unreadable.contains_key(company_id) {
                    continue;
                }
                let lines = by_company.get(company_id).map(Vec::as_slice).unwrap_or(&[]);
                match evaluate(metric, lines) {
                    Ok(value) => ranked.push(RankedCompany {
                        company_id: *company_id,
                        name: cp.company.name.clone(),
                        period_id: cp.period.period_id,
                        value,
                    }),
                    Err(e) => {
                        tracing::debug!(company_id, metric = metric.name(), "excluded: {}", e);
                    }
                }
            }
        }

        for (company_id, e) in &unreadable {
            tracing::warn!(company_id, metric = metric.name(), "excluded from ranking: {}", e);
        }

        let eligible = ranked.len();
        let companies = order_ranking(ranked, request.order, request.limit);

        tracing::info!(
            metric = metric.name(),
            year,
            order = %request.order,
            eligible,
            unreadable = unreadable.len(),
            returned = companies.len(),
            "ranking complete"
        );

        Ok(RankingResult {
            metric,
            fiscal_year: year,
            order: request.order,
            companies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Eight companies with revenue 10k..80k in 2023, plus distractors.
    fn fleet() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        for i in 1..=8i64 {
            let period_id = i * 10;
            ledger = ledger
                .with_company(i, &format!("Company {}", i))
                .with_period(period_id, i, date(2023, 12, 31), date(2023, 12, 31))
                .with_detail(i, period_id, "700000", None, Decimal::from(-10_000 * i));
            // Interim period that must not be picked.
            ledger = ledger
                .with_period(period_id + 1, i, date(2023, 6, 30), date(2023, 12, 31))
                .with_detail(i, period_id + 1, "700000", None, dec!(-999999));
        }
        // Company without a 2023 period.
        ledger
            .with_company(9, "Company 9")
            .with_period(90, 9, date(2022, 12, 31), date(2022, 12, 31))
            .with_detail(9, 90, "700000", None, dec!(-5000000))
    }

    fn request(metric: Metric, limit: i64, order: SortOrder) -> RankingRequest {
        RankingRequest::new(metric, 2023, limit, order).unwrap()
    }

    #[test]
    fn test_limit_bounds() {
        assert!(RankingRequest::new(Metric::Omzet, 2023, 100, SortOrder::Descending).is_ok());
        for bad in [0, -1, 101, 150] {
            let err = RankingRequest::new(Metric::Omzet, 2023, bad, SortOrder::Descending).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)), "limit {}", bad);
        }
    }

    #[test]
    fn test_order_ranking_tie_break() {
        let row = |company_id: i64, value: Decimal| RankedCompany {
            company_id,
            name: String::new(),
            period_id: company_id,
            value,
        };
        let rows = vec![row(3, dec!(5)), row(1, dec!(5)), row(2, dec!(9)), row(4, dec!(1))];

        let desc: Vec<i64> = order_ranking(rows.clone(), SortOrder::Descending, 10)
            .iter()
            .map(|r| r.company_id)
            .collect();
        assert_eq!(desc, vec![2, 1, 3, 4]);

        let asc: Vec<i64> = order_ranking(rows, SortOrder::Ascending, 3)
            .iter()
            .map(|r| r.company_id)
            .collect();
        assert_eq!(asc, vec![4, 1, 3]);
    }

    #[tokio::test]
    async fn test_top_five_of_eight() {
        let engine = RankingEngine::new(Arc::new(fleet()));
        let result = engine
            .rank(&request(Metric::Omzet, 5, SortOrder::Descending))
            .await
            .unwrap();

        let ids: Vec<i64> = result.companies.iter().map(|c| c.company_id).collect();
        assert_eq!(ids, vec![8, 7, 6, 5, 4]);
        assert_eq!(result.companies[0].value, dec!(80000));
        assert_eq!(result.companies[0].period_id, 80);
        assert!(result
            .companies
            .windows(2)
            .all(|w| w[0].value >= w[1].value));
    }

    #[tokio::test]
    async fn test_ascending_and_deterministic() {
        let engine = RankingEngine::new(Arc::new(fleet()));
        let req = request(Metric::Omzet, 3, SortOrder::Ascending);

        let first = engine.rank(&req).await.unwrap();
        let second = engine.rank(&req).await.unwrap();

        assert_eq!(first, second);
        let ids: Vec<i64> = first.companies.iter().map(|c| c.company_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_undefined_values_excluded() {
        let ledger = fleet()
            .with_company(10, "No Revenue BV")
            .with_period(100, 10, date(2023, 12, 31), date(2023, 12, 31))
            .with_detail(10, 100, "400000", None, dec!(1000));
        let engine = RankingEngine::new(Arc::new(ledger));

        let result = engine
            .rank(&request(Metric::Dso, 100, SortOrder::Descending))
            .await
            .unwrap();

        assert_eq!(result.companies.len(), 8);
        assert!(result.companies.iter().all(|c| c.company_id != 10));
    }

    #[tokio::test]
    async fn test_company_without_lines_ranks_at_zero() {
        let ledger = fleet()
            .with_company(11, "Dormant NV")
            .with_period(110, 11, date(2023, 12, 31), date(2023, 12, 31));
        let engine = RankingEngine::new(Arc::new(ledger));

        let result = engine
            .rank(&request(Metric::Omzet, 100, SortOrder::Ascending))
            .await
            .unwrap();

        assert_eq!(result.companies[0].company_id, 11);
        assert_eq!(result.companies[0].value, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_year_without_periods_is_empty() {
        let engine = RankingEngine::new(Arc::new(fleet()));
        let req = RankingRequest::new(Metric::Ebitda, 1999, 10, SortOrder::Descending).unwrap();
        let result = engine.rank(&req).await.unwrap();
        assert!(result.companies.is_empty());
    }
}
