use async_trait::async_trait;
use chrono::NaiveDate;
use ledger_core::{
    year_bounds, AccountDetail, AccountFilter, Company, CompanyBatch, CompanyPeriod, LedgerError,
    LedgerSource, LineSelector, Period, PrepaymentRecord, Reconciliation,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Pool sizing for [`LedgerDb`]
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Read-only SQLite ledger.
///
/// Every query checks one connection out of the pool and hands it back when
/// the guard drops, including when the calling future is cancelled.
#[derive(Clone)]
pub struct LedgerDb {
    pool: SqlitePool,
}

fn db_error(err: sqlx::Error) -> LedgerError {
    tracing::warn!(error = %err, "ledger query failed");
    LedgerError::DataSource(err.to_string())
}

/// Parse a monetary value read as text. SQLite may hand back `1.5e-05` for REAL columns.
fn parse_decimal(raw: &str) -> Result<Decimal, LedgerError> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| LedgerError::DataSource(format!("invalid decimal value '{}'", raw)))
}

/// Prepayment flags are stored as 0/1 or as words depending on the importer.
fn parse_flag(raw: Option<String>) -> Result<Option<bool>, LedgerError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Ok(Some(true)),
        "0" | "false" | "f" | "no" => Ok(Some(false)),
        other => Err(LedgerError::DataSource(format!(
            "invalid prepayment flag '{}'",
            other
        ))),
    }
}

fn parse_date(raw: Option<String>, column: &str) -> Result<NaiveDate, LedgerError> {
    let raw = raw.ok_or_else(|| LedgerError::DataSource(format!("{} is not a valid date", column)))?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| LedgerError::DataSource(format!("{} '{}' is not a valid date", column, raw)))
}

/// Append `(f1 OR f2 ...)`; an empty filter list selects nothing.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &[AccountFilter]) {
    let mut first = true;
    builder.push("(");
    for filter in filters {
        match filter {
            AccountFilter::Prefixes(prefixes) => {
                for prefix in prefixes.iter() {
                    if !first {
                        builder.push(" OR ");
                    }
                    builder.push("account_number LIKE ");
                    builder.push_bind(format!("{}%", prefix));
                    first = false;
                }
            }
            AccountFilter::Type(account_type) => {
                if !first {
                    builder.push(" OR ");
                }
                builder.push("account_type = ");
                builder.push_bind(account_type.as_str());
                first = false;
            }
        }
    }
    if first {
        builder.push("0");
    }
    builder.push(")");
}

const DETAIL_COLUMNS: &str = "SELECT company_id, period_id, \
     CAST(account_number AS TEXT) AS account_number, account_type, \
     CAST(value AS TEXT) AS value FROM account_details WHERE value IS NOT NULL AND ";

#[derive(sqlx::FromRow)]
struct CompanyRow {
    company_id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct PeriodRow {
    period_id: i64,
    company_id: i64,
    end_date: Option<String>,
    fiscal_year_end: Option<String>,
}

impl PeriodRow {
    fn into_period(self) -> Result<Period, LedgerError> {
        Ok(Period {
            period_id: self.period_id,
            company_id: self.company_id,
            end_date: parse_date(self.end_date, "end_date")?,
            fiscal_year_end: parse_date(self.fiscal_year_end, "fiscal_year_end")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CompanyPeriodRow {
    name: String,
    #[sqlx(flatten)]
    period: PeriodRow,
}

#[derive(sqlx::FromRow)]
struct DetailRow {
    company_id: i64,
    period_id: i64,
    account_number: Option<String>,
    account_type: Option<String>,
    value: String,
}

impl DetailRow {
    fn into_detail(self) -> Result<AccountDetail, LedgerError> {
        let account_number = self
            .account_number
            .ok_or_else(|| LedgerError::DataSource("account_number is missing".to_string()))?;
        Ok(AccountDetail {
            company_id: self.company_id,
            period_id: self.period_id,
            account_number,
            // Unknown types never match a type filter.
            account_type: self.account_type.and_then(|t| t.parse().ok()),
            value: parse_decimal(&self.value)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PrepaymentRow {
    company_id: i64,
    name: String,
    period_id: i64,
    end_date: Option<String>,
    prep1_made: Option<String>,
    prep2_made: Option<String>,
    prep3_made: Option<String>,
    prep4_made: Option<String>,
}

impl PrepaymentRow {
    fn into_record(self) -> Result<PrepaymentRecord, LedgerError> {
        Ok(PrepaymentRecord {
            company: Company {
                company_id: self.company_id,
                name: self.name,
            },
            period_id: self.period_id,
            end_date: parse_date(self.end_date, "end_date")?,
            made: [
                parse_flag(self.prep1_made)?,
                parse_flag(self.prep2_made)?,
                parse_flag(self.prep3_made)?,
                parse_flag(self.prep4_made)?,
            ],
        })
    }
}

impl LedgerDb {
    /// Open a read-only pool on an existing ledger database.
    pub async fn new(database_url: &str, config: &DbConfig) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_error)?
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        tracing::info!(max_connections = config.max_connections, "ledger database opened");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_detail_rows(
        &self,
        mut builder: QueryBuilder<'_, Sqlite>,
    ) -> Result<Vec<DetailRow>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = builder
            .build_query_as::<DetailRow>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error)?;
        Ok(rows)
    }

    async fn fetch_details(&self, builder: QueryBuilder<'_, Sqlite>) -> Result<Vec<AccountDetail>, LedgerError> {
        let rows = self.fetch_detail_rows(builder).await?;
        rows.into_iter().map(DetailRow::into_detail).collect()
    }
}

#[async_trait]
impl LedgerSource for LedgerDb {
    async fn companies(&self) -> Result<Vec<Company>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, CompanyRow>(
            "SELECT company_id, name FROM companies ORDER BY company_id",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| Company {
                company_id: r.company_id,
                name: r.name,
            })
            .collect())
    }

    async fn company_periods(&self, company_id: i64) -> Result<Vec<Period>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, PeriodRow>(
            "SELECT period_id, company_id,
                    date(end_date) AS end_date, date(fiscal_year_end) AS fiscal_year_end
             FROM periods WHERE company_id = ?
             ORDER BY date(end_date), period_id",
        )
        .bind(company_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(PeriodRow::into_period).collect()
    }

    async fn periods_in_year(&self, company_id: i64, year: i32) -> Result<Vec<Period>, LedgerError> {
        let (first, last) = year_bounds(year)?;
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, PeriodRow>(
            "SELECT period_id, company_id,
                    date(end_date) AS end_date, date(fiscal_year_end) AS fiscal_year_end
             FROM periods
             WHERE company_id = ? AND date(end_date) BETWEEN ? AND ?",
        )
        .bind(company_id)
        .bind(first.to_string())
        .bind(last.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        tracing::debug!(company_id, year, periods = rows.len(), "periods in year");

        rows.into_iter().map(PeriodRow::into_period).collect()
    }

    async fn all_periods_in_year(&self, year: i32) -> Result<CompanyBatch<CompanyPeriod>, LedgerError> {
        let (first, last) = year_bounds(year)?;
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, CompanyPeriodRow>(
            "SELECT c.name, p.period_id, p.company_id,
                    date(p.end_date) AS end_date, date(p.fiscal_year_end) AS fiscal_year_end
             FROM periods p
             JOIN companies c ON c.company_id = p.company_id
             WHERE date(p.end_date) BETWEEN ? AND ?",
        )
        .bind(first.to_string())
        .bind(last.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        Ok(CompanyBatch::from_results(rows.into_iter().map(|r| {
            let company_id = r.period.company_id;
            let converted = r.period.into_period().map(|period| CompanyPeriod {
                company: Company {
                    company_id,
                    name: r.name,
                },
                period,
            });
            (company_id, converted)
        })))
    }

    async fn account_details(
        &self,
        company_id: i64,
        period_id: i64,
        filters: &[AccountFilter],
    ) -> Result<Vec<AccountDetail>, LedgerError> {
        let mut builder = QueryBuilder::new(DETAIL_COLUMNS);
        builder.push("company_id = ");
        builder.push_bind(company_id);
        builder.push(" AND period_id = ");
        builder.push_bind(period_id);
        builder.push(" AND ");
        push_filters(&mut builder, filters);

        self.fetch_details(builder).await
    }

    async fn account_details_for_periods(
        &self,
        periods: &[Period],
        filters: &[AccountFilter],
    ) -> Result<CompanyBatch<AccountDetail>, LedgerError> {
        if periods.is_empty() {
            return Ok(CompanyBatch::from_rows(Vec::new()));
        }

        let mut builder = QueryBuilder::new(DETAIL_COLUMNS);
        builder.push("period_id IN (");
        let mut ids = builder.separated(", ");
        for period in periods {
            ids.push_bind(period.period_id);
        }
        ids.push_unseparated(") AND ");
        push_filters(&mut builder, filters);

        let rows = self.fetch_detail_rows(builder).await?;

        // Period ids are unique per ledger, but keep only the requested pairs.
        let requested: HashSet<(i64, i64)> = periods
            .iter()
            .map(|p| (p.company_id, p.period_id))
            .collect();

        Ok(CompanyBatch::from_results(
            rows.into_iter()
                .filter(|r| requested.contains(&(r.company_id, r.period_id)))
                .map(|r| (r.company_id, r.into_detail())),
        ))
    }

    async fn account_lines(&self, selector: &LineSelector) -> Result<Vec<AccountDetail>, LedgerError> {
        let mut builder = QueryBuilder::new(DETAIL_COLUMNS);
        builder.push("1 = 1");
        if let Some(company_id) = selector.company_id {
            builder.push(" AND company_id = ");
            builder.push_bind(company_id);
        }
        if let Some(period_id) = selector.period_id {
            builder.push(" AND period_id = ");
            builder.push_bind(period_id);
        }
        builder.push(" ORDER BY period_id, account_number");

        self.fetch_details(builder).await
    }

    async fn prepayments(&self, year: i32) -> Result<CompanyBatch<PrepaymentRecord>, LedgerError> {
        let (first, last) = year_bounds(year)?;
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, PrepaymentRow>(
            "SELECT c.company_id, c.name, p.period_id, date(p.end_date) AS end_date,
                    CAST(r.prep1_made AS TEXT) AS prep1_made,
                    CAST(r.prep2_made AS TEXT) AS prep2_made,
                    CAST(r.prep3_made AS TEXT) AS prep3_made,
                    CAST(r.prep4_made AS TEXT) AS prep4_made
             FROM reconciliation_results r
             JOIN periods p ON p.period_id = r.period_id AND p.company_id = r.company_id
             JOIN companies c ON c.company_id = r.company_id
             WHERE date(p.end_date) BETWEEN ? AND ?",
        )
        .bind(first.to_string())
        .bind(last.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        Ok(CompanyBatch::from_results(
            rows.into_iter().map(|r| (r.company_id, r.into_record())),
        ))
    }

    async fn tax_percentage(&self, company_id: i64, period_id: i64) -> Result<Option<Decimal>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let row = sqlx::query_as::<_, (Option<String>,)>(
            "SELECT CAST(tax_percentage AS TEXT) FROM reconciliation_results
             WHERE company_id = ? AND period_id = ?
             LIMIT 1",
        )
        .bind(company_id)
        .bind(period_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;

        match row.and_then(|(pct,)| pct) {
            Some(raw) => parse_decimal(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn reconciliations(&self, company_id: i64, period_id: i64) -> Result<Vec<Reconciliation>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT reconciliation_id, name FROM reconciliations
             WHERE company_id = ? AND period_id = ?
             ORDER BY reconciliation_id",
        )
        .bind(company_id)
        .bind(period_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|(reconciliation_id, name)| Reconciliation {
                reconciliation_id,
                name,
            })
            .collect())
    }
}
