pub mod catalog;
pub mod compute;
pub mod db;
pub mod dispatch;
pub mod memory;
pub mod period;
pub mod prepayment;
pub mod ranking;
pub mod tax;


pub use catalog::{supported_metrics, Metric, MetricInfo, MetricRule};
pub use compute::{evaluate, MetricComputation, MetricEngine};
pub use db::{DbConfig, LedgerDb};
pub use dispatch::{filter_companies, MetricService};
pub use memory::InMemoryLedger;
pub use period::PeriodResolver;
pub use prepayment::{PrepaymentReport, PrepaymentStatus, PrepaymentTerm, QuarterStatus};
pub use ranking::{RankedCompany, RankingEngine, RankingRequest, RankingResult, MAX_RANKING_LIMIT};
pub use tax::{TaxBracket, TaxRate, TaxRateChange};
