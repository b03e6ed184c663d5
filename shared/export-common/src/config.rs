//! TimescaleDB connection configuration
//!
//! The export worker and the table manager open separate connections to
//! the same database using this configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::sql::DdlOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimescaleConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Convert export tables into hypertables
    pub hypertables: bool,
    /// Multi-node deployment
    pub distributed_hypertables: bool,
    pub hypertable_replication_factor: u32,
}

impl Default for TimescaleConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            hypertables: true,
            distributed_hypertables: false,
            hypertable_replication_factor: 2,
        }
    }
}

impl TimescaleConfig {
    /// Load configuration from wasmCloud-style properties
    ///
    /// Properties:
    /// - timescaledb_host, timescaledb_port, timescaledb_database
    /// - timescaledb_username, timescaledb_password (required)
    /// - timescaledb_hypertables, timescaledb_distributed_hypertables
    /// - timescaledb_hypertable_replication_factor
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();

        let host = props
            .get("timescaledb_host")
            .cloned()
            .unwrap_or(defaults.host);
        let port = match props.get("timescaledb_port") {
            Some(v) => v
                .parse()
                .with_context(|| format!("Invalid timescaledb_port: {}", v))?,
            None => defaults.port,
        };
        let database = props
            .get("timescaledb_database")
            .cloned()
            .unwrap_or(defaults.database);
        let username = props
            .get("timescaledb_username")
            .cloned()
            .unwrap_or(defaults.username);
        let password = props
            .get("timescaledb_password")
            .cloned()
            .context("timescaledb_password property is required")?;
        let hypertables = props
            .get("timescaledb_hypertables")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hypertables);
        let distributed_hypertables = props
            .get("timescaledb_distributed_hypertables")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.distributed_hypertables);
        let hypertable_replication_factor = props
            .get("timescaledb_hypertable_replication_factor")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hypertable_replication_factor);

        Ok(Self {
            host,
            port,
            database,
            username,
            password,
            hypertables,
            distributed_hypertables,
            hypertable_replication_factor,
        })
    }

    /// Load configuration from environment variables (`TIMESCALEDB_*`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let props: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with("TIMESCALEDB_"))
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        Self::from_properties(&props).context("Failed to load TimescaleDB config from env")
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .password(&self.password)
            .application_name("timescale-export");
        config
    }

    pub fn ddl_options(&self) -> DdlOptions {
        DdlOptions {
            hypertables: self.hypertables,
            distributed_hypertables: self.distributed_hypertables,
            replication_factor: self.hypertable_replication_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties_defaults() {
        let config = TimescaleConfig::from_properties(&props(&[("timescaledb_password", "secret")]))
            .unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert!(config.hypertables);
        assert!(!config.distributed_hypertables);
        assert_eq!(config.hypertable_replication_factor, 2);
    }

    #[test]
    fn test_from_properties_overrides() {
        let config = TimescaleConfig::from_properties(&props(&[
            ("timescaledb_host", "tsdb.internal"),
            ("timescaledb_port", "6432"),
            ("timescaledb_database", "exports"),
            ("timescaledb_username", "writer"),
            ("timescaledb_password", "secret"),
            ("timescaledb_distributed_hypertables", "true"),
            ("timescaledb_hypertable_replication_factor", "3"),
        ]))
        .unwrap();

        assert_eq!(config.host, "tsdb.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.database, "exports");
        assert_eq!(config.username, "writer");
        assert_eq!(
            config.ddl_options(),
            DdlOptions {
                hypertables: true,
                distributed_hypertables: true,
                replication_factor: 3,
            }
        );
    }

    #[test]
    fn test_password_is_required() {
        assert!(TimescaleConfig::from_properties(&HashMap::new()).is_err());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = TimescaleConfig::from_properties(&props(&[
            ("timescaledb_password", "secret"),
            ("timescaledb_port", "not-a-port"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_pg_config() {
        let config = TimescaleConfig {
            host: "db".to_string(),
            port: 5433,
            ..Default::default()
        };
        let pg = config.pg_config();
        assert_eq!(pg.get_ports(), &[5433]);
        assert_eq!(pg.get_dbname(), Some("postgres"));
    }
}
