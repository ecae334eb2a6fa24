//! Dispatch layer: the entry point used by the assistant.
//!
//! Takes metric names and ISO dates as strings, validates them before any
//! query runs, and routes to the resolver, computation and ranking engines.

use chrono::Datelike;
use ledger_core::{
    parse_iso_date, year_bounds, AccountDetail, Company, LedgerError, LedgerSource, LineSelector,
    Period, Reconciliation, SortOrder,
};
use std::sync::Arc;

use crate::catalog::{supported_metrics, Metric, MetricInfo};
use crate::compute::{MetricComputation, MetricEngine};
use crate::period::PeriodResolver;
use crate::prepayment::{
    latest_records, validate_prepayment_year, PrepaymentReport, PrepaymentStatus, PrepaymentTerm,
};
use crate::ranking::{RankingEngine, RankingRequest, RankingResult};
use crate::tax::{normalize_percentage, TaxBracket, TaxRate, TaxRateChange};

/// Companies whose name contains any keyword, case-insensitively.
///
/// No keywords keeps every company.
pub fn filter_companies(companies: Vec<Company>, keywords: &[String]) -> Vec<Company> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        return companies;
    }

    companies
        .into_iter()
        .filter(|c| {
            let name = c.name.to_lowercase();
            keywords.iter().any(|k| name.contains(k.as_str()))
        })
        .collect()
}

pub struct MetricService<S> {
    source: Arc<S>,
    resolver: PeriodResolver<S>,
    engine: MetricEngine<S>,
    ranking: RankingEngine<S>,
}

impl<S: LedgerSource> MetricService<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            resolver: PeriodResolver::new(Arc::clone(&source)),
            engine: MetricEngine::new(Arc::clone(&source)),
            ranking: RankingEngine::new(Arc::clone(&source)),
            source,
        }
    }

    pub fn supported_metrics(&self) -> Vec<MetricInfo> {
        supported_metrics()
    }

    /// Compute a named metric for a company on the period covering `date`.
    pub async fn compute(
        &self,
        metric_name: &str,
        company_id: i64,
        date: &str,
    ) -> Result<MetricComputation, LedgerError> {
        let metric = Metric::lookup(metric_name)?;
        let date = parse_iso_date(date)?;

        let period = self.resolver.resolve(company_id, date).await?;
        let computation = self.engine.compute_for_period(metric, &period).await?;

        tracing::info!(
            metric = metric.name(),
            company_id,
            period_id = period.period_id,
            value = %computation.value,
            "metric computed"
        );

        Ok(computation)
    }

    /// Rank companies on a named metric for a fiscal year.
    ///
    /// All arguments are validated before the ledger is queried.
    pub async fn rank(
        &self,
        metric_name: &str,
        fiscal_year: i32,
        limit: i64,
        order: &str,
    ) -> Result<RankingResult, LedgerError> {
        let metric = Metric::lookup(metric_name)?;
        let order: SortOrder = order.parse()?;
        year_bounds(fiscal_year)?;
        let request = RankingRequest::new(metric, fiscal_year, limit, order)?;

        self.ranking.rank(&request).await
    }

    /// Like [`MetricService::rank`], on the fiscal year of an ISO date.
    pub async fn rank_for_date(
        &self,
        metric_name: &str,
        date: &str,
        limit: i64,
        order: &str,
    ) -> Result<RankingResult, LedgerError> {
        let date = parse_iso_date(date)?;
        self.rank(metric_name, date.year(), limit, order).await
    }

    pub async fn resolve_period(&self, company_id: i64, date: &str) -> Result<Period, LedgerError> {
        self.resolver.resolve_str(company_id, date).await
    }

    pub async fn find_companies(&self, keywords: &[String]) -> Result<Vec<Company>, LedgerError> {
        let companies = self.source.companies().await?;
        Ok(filter_companies(companies, keywords))
    }

    pub async fn company_periods(&self, company_id: i64) -> Result<Vec<Period>, LedgerError> {
        self.source.company_periods(company_id).await
    }

    /// Tax rate recorded for the period covering `date`.
    pub async fn tax_rate(&self, company_id: i64, date: &str) -> Result<TaxRate, LedgerError> {
        let period = self.resolver.resolve_str(company_id, date).await?;
        self.tax_rate_for(&period).await
    }

    /// Compare the tax rate of the year of `date` with the year before.
    pub async fn tax_rate_change(
        &self,
        company_id: i64,
        date: &str,
    ) -> Result<TaxRateChange, LedgerError> {
        let date = parse_iso_date(date)?;
        let period = self.resolver.resolve(company_id, date).await?;
        let current = self.tax_rate_for(&period).await?;

        let previous = match self.resolver.resolve_year(company_id, date.year() - 1).await {
            Ok(prev_period) => match self.tax_rate_for(&prev_period).await {
                Ok(rate) => Some(rate),
                Err(e) if e.is_no_data() => None,
                Err(e) => return Err(e),
            },
            Err(e) if e.is_no_data() => None,
            Err(e) => return Err(e),
        };

        Ok(TaxRateChange::new(current, previous))
    }

    pub async fn reconciliations(
        &self,
        company_id: i64,
        date: &str,
    ) -> Result<Vec<Reconciliation>, LedgerError> {
        let period = self.resolver.resolve_str(company_id, date).await?;
        self.source
            .reconciliations(company_id, period.period_id)
            .await
    }

    /// Quarterly prepayment status of every company reconciled in `year`.
    ///
    /// `term` 1..=4 selects one quarter, 0 all of them. Both arguments are
    /// validated before the ledger is queried.
    pub async fn prepayments(&self, term: i64, year: i32) -> Result<PrepaymentReport, LedgerError> {
        let term = PrepaymentTerm::new(term)?;
        let year = validate_prepayment_year(year)?;

        let batch = self.source.prepayments(year).await?;
        for (company_id, e) in &batch.rejected {
            tracing::warn!(company_id, year, "prepayments skipped: {}", e);
        }

        let companies: Vec<PrepaymentStatus> = latest_records(batch.rows)
            .values()
            .map(|record| PrepaymentStatus::project(record, term))
            .collect();

        tracing::info!(year, companies = companies.len(), "prepayment report");

        Ok(PrepaymentReport {
            year,
            term,
            companies,
            excluded: batch.rejected.keys().copied().collect(),
        })
    }

    /// Raw ledger lines of a company, a period, or both. Not used for metrics.
    pub async fn ledger_lines(
        &self,
        company_id: Option<i64>,
        period_id: Option<i64>,
    ) -> Result<Vec<AccountDetail>, LedgerError> {
        let selector = LineSelector::new(company_id, period_id)?;
        self.source.account_lines(&selector).await
    }

    async fn tax_rate_for(&self, period: &Period) -> Result<TaxRate, LedgerError> {
        let raw = self
            .source
            .tax_percentage(period.company_id, period.period_id)
            .await?
            .ok_or(LedgerError::NoReconciliation {
                company_id: period.company_id,
                period_id: period.period_id,
            })?;

        let percentage = normalize_percentage(raw);
        Ok(TaxRate {
            company_id: period.company_id,
            period_id: period.period_id,
            end_date: period.end_date,
            percentage,
            bracket: TaxBracket::classify(percentage),
        })
    }
}
