//! Error types for export definitions, coercion and database access

use thiserror::Error;

/// Raised when a raw field value cannot be converted to its column type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Value is not numeric-coercible
    #[error("cannot convert {value} to {column_type}")]
    NotNumeric { column_type: String, value: String },

    /// Value does not fit the declared integer width
    #[error("value {value} out of range for {column_type}")]
    OutOfRange { column_type: String, value: String },

    /// Timestamp column without a time format
    #[error("timestamp column requires a time_format")]
    MissingTimeFormat,

    /// Timestamp value could not be interpreted
    #[error("invalid timestamp {value} (format {format}): {reason}")]
    InvalidTimestamp {
        value: String,
        format: String,
        reason: String,
    },
}

/// Export definition validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("table_name must not be empty")]
    EmptyTableName,

    #[error("table_columns must declare at least one column")]
    NoColumns,

    #[error("column spec must be [name, type, modifiers...], got {0:?}")]
    MalformedColumn(Vec<String>),

    #[error("column {0} declared more than once")]
    DuplicateColumn(String),

    #[error("column {column} has unknown type {type_name}")]
    UnknownColumnType { column: String, type_name: String },

    #[error("time_column {0} is not a declared column")]
    TimeColumnNotDeclared(String),

    #[error("mapping key {0} is not of the form <column>:<kind>")]
    MalformedMappingKey(String),

    #[error("data mapping {key} references undeclared column {column}")]
    UnknownMappingColumn { key: String, column: String },
}

/// The owning subsystem no longer knows this export
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown export id {0}")]
pub struct UnknownExport(pub String);

/// Database access errors, split by whether a retry can help
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// Connectivity fault (closed connection, I/O, server shutting down)
    #[error("connection error: {0}")]
    Connection(String),

    /// The statement itself failed
    #[error("statement error: {0}")]
    Statement(String),
}

impl DatabaseError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DatabaseError::Connection(_))
    }
}

/// SQLSTATE codes outside class 08 that still mean the connection is unusable
const CONNECTIVITY_SQLSTATES: &[&str] = &["57P01", "57P02", "57P03", "53300"];

impl From<tokio_postgres::Error> for DatabaseError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return DatabaseError::Connection(err.to_string());
        }

        if let Some(state) = err.code() {
            let code = state.code();
            if code.starts_with("08") || CONNECTIVITY_SQLSTATES.contains(&code) {
                return DatabaseError::Connection(err.to_string());
            }
            return DatabaseError::Statement(err.to_string());
        }

        let io_failure = std::error::Error::source(&err)
            .map(|source| source.downcast_ref::<std::io::Error>().is_some())
            .unwrap_or(false);
        if io_failure {
            DatabaseError::Connection(err.to_string())
        } else {
            DatabaseError::Statement(err.to_string())
        }
    }
}
