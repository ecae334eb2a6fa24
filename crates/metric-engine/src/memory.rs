use async_trait::async_trait;
use chrono::NaiveDate;
use ledger_core::{
    AccountDetail, AccountFilter, AccountType, Company, CompanyBatch, CompanyPeriod, LedgerError,
    LedgerSource, LineSelector, Period, PrepaymentRecord, Reconciliation,
};
use rust_decimal::Decimal;

/// Ledger held entirely in memory.
///
/// Applies account filters in-process, so the catalog rules run against it
/// exactly as they run against the database. Handy for fixtures and for
/// callers that already hold the ledger lines.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    companies: Vec<Company>,
    periods: Vec<Period>,
    details: Vec<AccountDetail>,
    tax_percentages: Vec<(i64, i64, Decimal)>,
    reconciliations: Vec<(i64, i64, Reconciliation)>,
    prepayments: Vec<(i64, i64, [Option<bool>; 4])>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, company_id: i64, name: &str) -> Self {
        self.companies.push(Company {
            company_id,
            name: name.to_string(),
        });
        self
    }

    pub fn with_period(
        mut self,
        period_id: i64,
        company_id: i64,
        end_date: NaiveDate,
        fiscal_year_end: NaiveDate,
    ) -> Self {
        self.periods.push(Period {
            period_id,
            company_id,
            end_date,
            fiscal_year_end,
        });
        self
    }

    pub fn with_detail(
        mut self,
        company_id: i64,
        period_id: i64,
        account_number: &str,
        account_type: Option<AccountType>,
        value: Decimal,
    ) -> Self {
        self.details.push(AccountDetail {
            company_id,
            period_id,
            account_number: account_number.to_string(),
            account_type,
            value,
        });
        self
    }

    pub fn with_tax_percentage(mut self, company_id: i64, period_id: i64, percentage: Decimal) -> Self {
        self.tax_percentages.push((company_id, period_id, percentage));
        self
    }

    pub fn with_prepayments(mut self, company_id: i64, period_id: i64, made: [Option<bool>; 4]) -> Self {
        self.prepayments.push((company_id, period_id, made));
        self
    }

    fn company(&self, company_id: i64) -> Option<&Company> {
        self.companies.iter().find(|c| c.company_id == company_id)
    }

    pub fn with_reconciliation(
        mut self,
        company_id: i64,
        period_id: i64,
        reconciliation_id: i64,
        name: &str,
    ) -> Self {
        self.reconciliations.push((
            company_id,
            period_id,
            Reconciliation {
                reconciliation_id,
                name: name.to_string(),
            },
        ));
        self
    }

    fn selected<'a>(
        &'a self,
        filters: &'a [AccountFilter],
        keep: impl Fn(&AccountDetail) -> bool + 'a,
    ) -> impl Iterator<Item = &'a AccountDetail> + 'a {
        self.details
            .iter()
            .filter(move |d| keep(*d) && filters.iter().any(|f| f.matches(*d)))
    }
}

#[async_trait]
impl LedgerSource for InMemoryLedger {
    async fn companies(&self) -> Result<Vec<Company>, LedgerError> {
        let mut companies = self.companies.clone();
        companies.sort_by_key(|c| c.company_id);
        Ok(companies)
    }

    async fn company_periods(&self, company_id: i64) -> Result<Vec<Period>, LedgerError> {
        let mut periods: Vec<Period> = self
            .periods
            .iter()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| (p.end_date, p.period_id));
        Ok(periods)
    }

    async fn periods_in_year(&self, company_id: i64, year: i32) -> Result<Vec<Period>, LedgerError> {
        Ok(self
            .periods
            .iter()
            .filter(|p| p.company_id == company_id && p.year() == year)
            .cloned()
            .collect())
    }

    async fn all_periods_in_year(&self, year: i32) -> Result<CompanyBatch<CompanyPeriod>, LedgerError> {
        let rows = self
            .periods
            .iter()
            .filter(|p| p.year() == year)
            .filter_map(|p| {
                self.company(p.company_id).map(|company| CompanyPeriod {
                    company: company.clone(),
                    period: p.clone(),
                })
            })
            .collect();
        Ok(CompanyBatch::from_rows(rows))
    }

    async fn account_details(
        &self,
        company_id: i64,
        period_id: i64,
        filters: &[AccountFilter],
    ) -> Result<Vec<AccountDetail>, LedgerError> {
        Ok(self
            .selected(filters, move |d| {
                d.company_id == company_id && d.period_id == period_id
            })
            .cloned()
            .collect())
    }

    async fn account_details_for_periods(
        &self,
        periods: &[Period],
        filters: &[AccountFilter],
    ) -> Result<CompanyBatch<AccountDetail>, LedgerError> {
        let rows = self
            .selected(filters, |d| {
                periods
                    .iter()
                    .any(|p| p.company_id == d.company_id && p.period_id == d.period_id)
            })
            .cloned()
            .collect();
        Ok(CompanyBatch::from_rows(rows))
    }

    async fn account_lines(&self, selector: &LineSelector) -> Result<Vec<AccountDetail>, LedgerError> {
        let mut lines: Vec<AccountDetail> = self
            .details
            .iter()
            .filter(|d| selector.matches(d))
            .cloned()
            .collect();
        lines.sort_by(|a, b| {
            a.period_id
                .cmp(&b.period_id)
                .then_with(|| a.account_number.cmp(&b.account_number))
        });
        Ok(lines)
    }

    async fn prepayments(&self, year: i32) -> Result<CompanyBatch<PrepaymentRecord>, LedgerError> {
        let rows = self
            .prepayments
            .iter()
            .filter_map(|(company_id, period_id, made)| {
                let period = self
                    .periods
                    .iter()
                    .find(|p| p.period_id == *period_id && p.company_id == *company_id)?;
                if period.year() != year {
                    return None;
                }
                let company = self.company(*company_id)?;
                Some(PrepaymentRecord {
                    company: company.clone(),
                    period_id: *period_id,
                    end_date: period.end_date,
                    made: *made,
                })
            })
            .collect();
        Ok(CompanyBatch::from_rows(rows))
    }

    async fn tax_percentage(&self, company_id: i64, period_id: i64) -> Result<Option<Decimal>, LedgerError> {
        Ok(self
            .tax_percentages
            .iter()
            .find(|(c, p, _)| *c == company_id && *p == period_id)
            .map(|(_, _, pct)| *pct))
    }

    async fn reconciliations(&self, company_id: i64, period_id: i64) -> Result<Vec<Reconciliation>, LedgerError> {
        let mut found: Vec<Reconciliation> = self
            .reconciliations
            .iter()
            .filter(|(c, p, _)| *c == company_id && *p == period_id)
            .map(|(_, _, r)| r.clone())
            .collect();
        found.sort_by_key(|r| r.reconciliation_id);
        Ok(found)
    }
}
