use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported metric '{name}'. Supported metrics: {}", supported.join(", "))]
    UnknownMetric {
        name: String,
        supported: Vec<String>,
    },

    #[error("No period found for company {company_id} in {year}")]
    NoPeriodFound { company_id: i64, year: i32 },

    #[error("No reconciliation result for company {company_id}, period {period_id}")]
    NoReconciliation { company_id: i64, period_id: i64 },

    #[error("{metric} is undefined: denominator is zero")]
    DivisionUndefined { metric: String },

    #[error("Data source error: {0}")]
    DataSource(String),
}

impl LedgerError {
    /// Message safe to show to an end user.
    ///
    /// Data source failures carry driver details that belong in the logs only.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::DataSource(_) => {
                "The ledger database is currently unavailable. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::DataSource(_))
    }

    /// "No data" outcomes, as opposed to bad requests or failures.
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            LedgerError::NoPeriodFound { .. } | LedgerError::NoReconciliation { .. }
        )
    }
}
