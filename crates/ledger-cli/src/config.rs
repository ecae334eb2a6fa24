use anyhow::{bail, Context, Result};
use metric_engine::{DbConfig, MAX_RANKING_LIMIT};
use serde::Serialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,      // 5
    pub acquire_timeout_secs: u64, // 5
    pub default_limit: i64,        // 10
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite:ledger.db".to_string()),
            max_connections: var("LEDGER_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("LEDGER_MAX_CONNECTIONS must be a positive integer")?,
            acquire_timeout_secs: var("LEDGER_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("LEDGER_ACQUIRE_TIMEOUT_SECS must be a number of seconds")?,
            default_limit: var("LEDGER_DEFAULT_LIMIT")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("LEDGER_DEFAULT_LIMIT must be an integer")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            bail!("LEDGER_MAX_CONNECTIONS must be at least 1");
        }
        if !(1..=MAX_RANKING_LIMIT).contains(&self.default_limit) {
            bail!(
                "LEDGER_DEFAULT_LIMIT must be between 1 and {}, got {}",
                MAX_RANKING_LIMIT,
                self.default_limit
            );
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LedgerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:ledger.db");
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.db_config().acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "sqlite:/data/ledger.db"),
            ("LEDGER_MAX_CONNECTIONS", "2"),
            ("LEDGER_DEFAULT_LIMIT", "100"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite:/data/ledger.db");
        assert_eq!(config.db_config().max_connections, 2);
        assert_eq!(config.default_limit, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("LEDGER_DEFAULT_LIMIT", "150")]).is_err());
        assert!(load(&[("LEDGER_MAX_CONNECTIONS", "0")]).is_err());
        assert!(load(&[("LEDGER_ACQUIRE_TIMEOUT_SECS", "soon")]).is_err());
    }
}
