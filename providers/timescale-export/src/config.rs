//! Worker, table manager and service configuration

use anyhow::{Context, Result};
use export_common::{RetryConfig, TimescaleConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn parse_prop<T: std::str::FromStr>(props: &HashMap<String, String>, key: &str) -> Option<T> {
    props.get(key).and_then(|v| v.parse().ok())
}

fn env_props(prefix: &str) -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

/// Export worker polling and write settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub poll_timeout: Duration,
    /// Maximum records per poll
    pub poll_limit: usize,
    /// Maximum rows per INSERT statement
    pub page_size: usize,
    /// Source error codes logged and dropped instead of stopping the worker
    pub ignored_error_codes: Vec<i32>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            poll_limit: 1000,
            page_size: 100,
            ignored_error_codes: vec![3],
        }
    }
}

impl WorkerConfig {
    /// Properties: export_poll_timeout_ms, export_poll_limit,
    /// export_page_size, export_ignored_error_codes (comma separated)
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let ignored_error_codes = props
            .get("export_ignored_error_codes")
            .map(|v| {
                v.split(',')
                    .filter_map(|code| code.trim().parse().ok())
                    .collect()
            })
            .unwrap_or(defaults.ignored_error_codes);

        Self {
            poll_timeout: parse_prop(props, "export_poll_timeout_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            poll_limit: parse_prop(props, "export_poll_limit").unwrap_or(defaults.poll_limit),
            page_size: parse_prop(props, "export_page_size").unwrap_or(defaults.page_size),
            ignored_error_codes,
        }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_properties(&env_props("EXPORT_"))
    }
}

/// Table lifecycle manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManagerConfig {
    /// Queue wait before re-checking for a stop request
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Values above 1.0 grow the delay after each failed attempt
    pub retry_multiplier: f64,
    /// Cap on a grown delay
    pub max_retry_delay: Duration,
}

impl Default for TableManagerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retries: 2,
            retry_delay: Duration::from_secs(2),
            retry_multiplier: 1.0,
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl TableManagerConfig {
    /// Properties: table_manager_timeout_ms, table_manager_retries,
    /// table_manager_retry_delay_ms, table_manager_retry_multiplier,
    /// table_manager_max_retry_delay_ms
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            timeout: parse_prop(props, "table_manager_timeout_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            retries: parse_prop(props, "table_manager_retries").unwrap_or(defaults.retries),
            retry_delay: parse_prop(props, "table_manager_retry_delay_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            retry_multiplier: parse_prop(props, "table_manager_retry_multiplier")
                .filter(|m: &f64| m.is_finite())
                .unwrap_or(defaults.retry_multiplier),
            max_retry_delay: parse_prop(props, "table_manager_max_retry_delay_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_retry_delay),
        }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_properties(&env_props("TABLE_MANAGER_"))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            multiplier: self.retry_multiplier,
            max_delay: self.max_retry_delay,
            ..RetryConfig::new(self.retries, self.retry_delay)
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub timescale: TimescaleConfig,
    pub worker: WorkerConfig,
    pub table_manager: TableManagerConfig,
}

impl ServiceConfig {
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            timescale: TimescaleConfig::from_properties(props)
                .context("Invalid TimescaleDB configuration")?,
            worker: WorkerConfig::from_properties(props),
            table_manager: TableManagerConfig::from_properties(props),
        })
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            timescale: TimescaleConfig::from_env()?,
            worker: WorkerConfig::from_env(),
            table_manager: TableManagerConfig::from_env(),
        })
    }
}
