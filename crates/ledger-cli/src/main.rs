//! ledger-cli: compute accounting metrics over a company ledger and print JSON.
//!
//! Usage:
//!   ledger-cli metrics
//!   ledger-cli metric "EBITDA marge" 42 2023-12-31
//!   ledger-cli rank Omzet 2023 --limit 5 --order DESC
//!   ledger-cli rank Omzet 2023-12-31
//!   ledger-cli companies bakkerij garage
//!   ledger-cli periods 42
//!   ledger-cli tax 42 2023-12-31
//!   ledger-cli tax-change 42 2023-12-31
//!   ledger-cli reconciliations 42 2023-12-31
//!   ledger-cli prepayments 0 2023
//!   ledger-cli lines --company 42 --period 7

mod config;

use anyhow::Context;
use config::LedgerConfig;
use ledger_core::{LedgerError, LedgerSource};
use metric_engine::{LedgerDb, MetricService};
use serde::Serialize;
use std::sync::Arc;

const USAGE: &str = "usage: ledger-cli <command> [args]

commands:
  metrics                                     list supported metrics
  metric <name> <company_id> <date>           compute one metric
  rank <name> <year|date> [--limit N] [--order ASC|DESC]
  companies [keyword ...]                     search companies by name
  periods <company_id>                        list a company's periods
  tax <company_id> <date>                     corporate tax rate
  tax-change <company_id> <date>              tax rate against previous year
  reconciliations <company_id> <date>         reconciliations of a period
  prepayments <term> <year>                   quarterly tax prepayments (term 0 = all)
  lines [--company N] [--period N]            raw ledger lines";

#[derive(Debug, Clone, PartialEq)]
enum YearOrDate {
    Year(i32),
    Date(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Metrics,
    Metric {
        name: String,
        company_id: i64,
        date: String,
    },
    Rank {
        name: String,
        when: YearOrDate,
        limit: Option<i64>,
        order: String,
    },
    Companies(Vec<String>),
    Periods(i64),
    Tax(i64, String),
    TaxChange(i64, String),
    Reconciliations(i64, String),
    Prepayments {
        term: i64,
        year: i32,
    },
    Lines {
        company_id: Option<i64>,
        period_id: Option<i64>,
    },
}

fn company_id(raw: Option<&String>) -> Result<i64, String> {
    let raw = raw.ok_or("missing company id")?;
    raw.parse()
        .map_err(|_| format!("company id must be an integer, got '{}'", raw))
}

fn required(raw: Option<&String>, what: &str) -> Result<String, String> {
    raw.cloned().ok_or_else(|| format!("missing {}", what))
}

fn optional_id(args: &[String], flag: &str) -> Result<Option<i64>, String> {
    match flag_value(args, flag) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("{} must be an integer, got '{}'", flag, v)),
        None => Ok(None),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let (cmd, rest) = args.split_first().ok_or("missing command")?;

    let command = match cmd.as_str() {
        "metrics" => Command::Metrics,
        "metric" => Command::Metric {
            name: required(rest.first(), "metric name")?,
            company_id: company_id(rest.get(1))?,
            date: required(rest.get(2), "date")?,
        },
        "rank" => {
            let name = required(rest.first(), "metric name")?;
            let raw = required(rest.get(1), "fiscal year or date")?;
            let when = match raw.parse::<i32>() {
                Ok(year) => YearOrDate::Year(year),
                Err(_) => YearOrDate::Date(raw),
            };
            let limit = match flag_value(rest, "--limit") {
                Some(v) => Some(
                    v.parse()
                        .map_err(|_| format!("limit must be an integer, got '{}'", v))?,
                ),
                None => None,
            };
            let order = flag_value(rest, "--order")
                .cloned()
                .unwrap_or_else(|| "DESC".to_string());
            Command::Rank {
                name,
                when,
                limit,
                order,
            }
        }
        "companies" => Command::Companies(rest.to_vec()),
        "periods" => Command::Periods(company_id(rest.first())?),
        "tax" => Command::Tax(company_id(rest.first())?, required(rest.get(1), "date")?),
        "tax-change" => {
            Command::TaxChange(company_id(rest.first())?, required(rest.get(1), "date")?)
        }
        "reconciliations" => {
            Command::Reconciliations(company_id(rest.first())?, required(rest.get(1), "date")?)
        }
        "prepayments" => {
            let term = required(rest.first(), "term")?;
            let year = required(rest.get(1), "year")?;
            Command::Prepayments {
                term: term
                    .parse()
                    .map_err(|_| format!("term must be an integer, got '{}'", term))?,
                year: year
                    .parse()
                    .map_err(|_| format!("year must be an integer, got '{}'", year))?,
            }
        }
        "lines" => Command::Lines {
            company_id: optional_id(rest, "--company")?,
            period_id: optional_id(rest, "--period")?,
        },
        other => return Err(format!("unknown command '{}'", other)),
    };

    Ok(command)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(value).map_err(|e| LedgerError::DataSource(e.to_string()))
}

async fn run<S: LedgerSource>(
    command: Command,
    service: &MetricService<S>,
    default_limit: i64,
) -> Result<serde_json::Value, LedgerError> {
    match command {
        Command::Metrics => to_json(&service.supported_metrics()),
        Command::Metric {
            name,
            company_id,
            date,
        } => to_json(&service.compute(&name, company_id, &date).await?),
        Command::Rank {
            name,
            when,
            limit,
            order,
        } => {
            let limit = limit.unwrap_or(default_limit);
            let result = match when {
                YearOrDate::Year(year) => service.rank(&name, year, limit, &order).await?,
                YearOrDate::Date(date) => {
                    service.rank_for_date(&name, &date, limit, &order).await?
                }
            };
            to_json(&result)
        }
        Command::Companies(keywords) => to_json(&service.find_companies(&keywords).await?),
        Command::Periods(company_id) => to_json(&service.company_periods(company_id).await?),
        Command::Tax(company_id, date) => to_json(&service.tax_rate(company_id, &date).await?),
        Command::TaxChange(company_id, date) => {
            to_json(&service.tax_rate_change(company_id, &date).await?)
        }
        Command::Reconciliations(company_id, date) => {
            to_json(&service.reconciliations(company_id, &date).await?)
        }
        Command::Prepayments { term, year } => to_json(&service.prepayments(term, year).await?),
        Command::Lines {
            company_id,
            period_id,
        } => to_json(&service.ledger_lines(company_id, period_id).await?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays machine-readable.
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ledger_cli=info,metric_engine=info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ledger_cli=info,metric_engine=info")),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("error: {}\n\n{}", msg, USAGE);
            std::process::exit(1);
        }
    };

    let config = LedgerConfig::from_env()?;
    let db = LedgerDb::new(&config.database_url, &config.db_config())
        .await
        .with_context(|| format!("failed to open ledger at {}", config.database_url))?;
    let service = MetricService::new(Arc::new(db));

    match run(command, &service, config.default_limit).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "request failed");
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metric_engine::InMemoryLedger;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_metric_command() {
        let cmd = parse_command(&args(&["metric", "EBITDA marge", "42", "2023-12-31"])).unwrap();
        assert_eq!(
            cmd,
            Command::Metric {
                name: "EBITDA marge".to_string(),
                company_id: 42,
                date: "2023-12-31".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rank_command() {
        let cmd = parse_command(&args(&["rank", "Omzet", "2023", "--order", "asc", "--limit", "5"])).unwrap();
        assert_eq!(
            cmd,
            Command::Rank {
                name: "Omzet".to_string(),
                when: YearOrDate::Year(2023),
                limit: Some(5),
                order: "asc".to_string(),
            }
        );

        let by_date = parse_command(&args(&["rank", "Omzet", "2023-12-31"])).unwrap();
        assert!(matches!(
            by_date,
            Command::Rank { when: YearOrDate::Date(_), limit: None, .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command(&[]).is_err());
        assert!(parse_command(&args(&["explode"])).is_err());
        assert!(parse_command(&args(&["periods", "abc"])).is_err());
        assert!(parse_command(&args(&["rank", "Omzet", "2023", "--limit", "many"])).is_err());
        assert!(parse_command(&args(&["tax", "42"])).is_err());
        assert!(parse_command(&args(&["prepayments", "1"])).is_err());
        assert!(parse_command(&args(&["lines", "--period", "x"])).is_err());
    }

    #[test]
    fn test_parse_prepayments_and_lines() {
        assert_eq!(
            parse_command(&args(&["prepayments", "0", "2023"])).unwrap(),
            Command::Prepayments { term: 0, year: 2023 }
        );
        assert_eq!(
            parse_command(&args(&["lines", "--period", "7"])).unwrap(),
            Command::Lines {
                company_id: None,
                period_id: Some(7),
            }
        );
    }

    #[tokio::test]
    async fn test_run_outputs_json() {
        let ledger = InMemoryLedger::new().with_company(42, "Bakkerij Peeters BV");
        let service = MetricService::new(Arc::new(ledger));

        let output = run(Command::Companies(vec![]), &service, 10).await.unwrap();
        assert_eq!(output[0]["name"], "Bakkerij Peeters BV");

        let err = run(
            Command::Rank {
                name: "Omzet".to_string(),
                when: YearOrDate::Year(2023),
                limit: Some(150),
                order: "DESC".to_string(),
            },
            &service,
            10,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        let err = run(
            Command::Lines {
                company_id: None,
                period_id: None,
            },
            &service,
            10,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        let report = run(Command::Prepayments { term: 0, year: 2023 }, &service, 10)
            .await
            .unwrap();
        assert_eq!(report["term"], 0);
        assert!(report["companies"].as_array().unwrap().is_empty());
    }
}
