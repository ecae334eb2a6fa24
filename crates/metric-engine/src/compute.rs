//! Metric Computation Engine
//!
//! Turns the ledger lines of one (company, period) into a metric value.
//! All arithmetic is exact decimal.

use chrono::NaiveDate;
use ledger_core::{AccountDetail, AccountFilter, LedgerError, LedgerSource, Period};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::catalog::{Metric, MetricRule, Term};

/// A metric value together with the period it was computed for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricComputation {
    pub metric: Metric,
    pub company_id: i64,
    pub period_id: i64,
    pub end_date: NaiveDate,
    pub value: Decimal,
}

/// Sum of the lines matching `filter`. An empty selection sums to zero.
fn raw_sum(filter: &AccountFilter, details: &[AccountDetail]) -> Decimal {
    details
        .iter()
        .filter(|d| filter.matches(d))
        .map(|d| d.value)
        .sum()
}

fn signed_sum(term: &Term, details: &[AccountDetail]) -> Decimal {
    term.sign.apply(raw_sum(&term.filter, details))
}

/// Evaluate `metric` over already-fetched ledger lines.
///
/// `details` may contain lines the metric does not read; they are ignored.
pub fn evaluate(metric: Metric, details: &[AccountDetail]) -> Result<Decimal, LedgerError> {
    combine(metric, details).map(|value| value.normalize())
}

fn combine(metric: Metric, details: &[AccountDetail]) -> Result<Decimal, LedgerError> {
    match metric.rule() {
        MetricRule::Sum(term) => Ok(signed_sum(&term, details)),
        MetricRule::Difference { plus, minus } => {
            Ok(signed_sum(&plus, details) - signed_sum(&minus, details))
        }
        MetricRule::Ratio {
            numerator,
            denominator,
            absolute,
            scale,
        } => {
            let numerator = raw_sum(&numerator, details);
            let denominator = raw_sum(&denominator, details);
            let undefined = || LedgerError::DivisionUndefined {
                metric: metric.name().to_string(),
            };

            if denominator.is_zero() {
                return Err(undefined());
            }

            // Overflow means the ratio has no representable value.
            let ratio = numerator.checked_div(denominator).ok_or_else(undefined)?;
            let ratio = if absolute { ratio.abs() } else { ratio };
            ratio
                .checked_mul(Decimal::from(scale))
                .ok_or_else(undefined)
        }
    }
}

pub struct MetricEngine<S> {
    source: Arc<S>,
}

impl<S: LedgerSource> MetricEngine<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Compute `metric` for one company and an already resolved period.
    pub async fn compute(
        &self,
        metric: Metric,
        company_id: i64,
        period_id: i64,
    ) -> Result<Decimal, LedgerError> {
        let filters = metric.rule().filters();
        let details = self
            .source
            .account_details(company_id, period_id, &filters)
            .await?;

        tracing::debug!(
            metric = metric.name(),
            company_id,
            period_id,
            lines = details.len(),
            "evaluating metric"
        );

        evaluate(metric, &details)
    }

    pub async fn compute_for_period(
        &self,
        metric: Metric,
        period: &Period,
    ) -> Result<MetricComputation, LedgerError> {
        let value = self
            .compute(metric, period.company_id, period.period_id)
            .await?;

        Ok(MetricComputation {
            metric,
            company_id: period.company_id,
            period_id: period.period_id,
            end_date: period.end_date,
            value,
        })
    }
}
