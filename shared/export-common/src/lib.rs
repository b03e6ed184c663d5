//! Export Common Library
//!
//! Shared types and utilities for the TimescaleDB export worker:
//! export definitions and their validation, type-directed value coercion,
//! SQL generation, the database seam with its tokio-postgres
//! implementation, retry primitives and database configuration.

pub mod config;
pub mod connection;
pub mod converter;
pub mod error;
pub mod sql;
pub mod retry;
pub mod types;
pub mod validation;

pub use config::TimescaleConfig;
pub use connection::{Database, PgDatabase, SqlStatement, TransactionError};
pub use converter::TimeFormat;
pub use error::{ConversionError, DatabaseError, UnknownExport, ValidationError};
pub use retry::{sleep_or_cancel, IsRetryable, RetryConfig, RetryState};
pub use sql::DdlOptions;
pub use types::*;
pub use validation::validate_export;
