use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    AccountDetail, AccountFilter, Company, CompanyBatch, CompanyPeriod, LedgerError, LineSelector,
    Period, PrepaymentRecord, Reconciliation,
};

/// Read-only access to the ledger.
///
/// Implementations must select ledger lines using exactly the filters given
/// (a line is returned when it matches any of them) and never write.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// All companies, ordered by id.
    async fn companies(&self) -> Result<Vec<Company>, LedgerError>;

    /// Every period of one company, ordered by end date.
    async fn company_periods(&self, company_id: i64) -> Result<Vec<Period>, LedgerError>;

    /// Periods of one company whose end date falls in `year`.
    async fn periods_in_year(&self, company_id: i64, year: i32) -> Result<Vec<Period>, LedgerError>;

    /// Periods of every company whose end date falls in `year`, joined with the company.
    ///
    /// Companies with an unreadable period row are rejected, not fatal.
    async fn all_periods_in_year(&self, year: i32) -> Result<CompanyBatch<CompanyPeriod>, LedgerError>;

    /// Ledger lines of one (company, period) matching any of `filters`.
    async fn account_details(
        &self,
        company_id: i64,
        period_id: i64,
        filters: &[AccountFilter],
    ) -> Result<Vec<AccountDetail>, LedgerError>;

    /// Ledger lines of many (company, period) pairs in a single round trip.
    ///
    /// Companies with an unreadable line are rejected, not fatal.
    async fn account_details_for_periods(
        &self,
        periods: &[Period],
        filters: &[AccountFilter],
    ) -> Result<CompanyBatch<AccountDetail>, LedgerError>;

    /// Unfiltered ledger lines for a listing, ordered by period and account number.
    async fn account_lines(&self, selector: &LineSelector) -> Result<Vec<AccountDetail>, LedgerError>;

    /// Corporate tax percentage recorded by the reconciliation of a period.
    async fn tax_percentage(&self, company_id: i64, period_id: i64) -> Result<Option<Decimal>, LedgerError>;

    /// Prepayment flags of every reconciled period ending in `year`.
    async fn prepayments(&self, year: i32) -> Result<CompanyBatch<PrepaymentRecord>, LedgerError>;

    async fn reconciliations(&self, company_id: i64, period_id: i64) -> Result<Vec<Reconciliation>, LedgerError>;
}
