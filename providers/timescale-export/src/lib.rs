//! TimescaleDB Export Provider
//!
//! Streams filtered export records into TimescaleDB tables and keeps those
//! tables in step with the set of export definitions.
//!
//! This provider:
//! - Polls a [`RecordSource`] for records already matched to export ids
//! - Builds per-table row groups and drops rows superseded by a later
//!   record with the same time value on `time_unique` tables
//! - Writes each cycle in one transaction, then advances source offsets
//! - Creates and drops tables asynchronously through the [`TableManager`]
//!
//! Configuration via environment variables:
//! - TIMESCALEDB_*: connection and hypertable settings
//! - EXPORT_*: polling and paging
//! - TABLE_MANAGER_*: queue timeout and DDL retries

pub mod batch;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod service;
pub mod source;
pub mod table_manager;
pub mod worker;
pub mod writer;

pub use batch::{generate_rows_batch, ColumnGroup, RowsBatch, TableBatch};
pub use catalog::ExportCatalog;
pub use config::{ServiceConfig, TableManagerConfig, WorkerConfig};
pub use dedup::deduplicate_rows_batch;
pub use service::ExportService;
pub use source::{BatchError, ExportResolver, PollBatch, RecordSource, SourceError, SyncOutcome};
pub use table_manager::{
    TableManager, TableManagerError, TableManagerHandle, TableOperation, TableQueue,
};
pub use worker::{ExportWorker, WorkerError, WorkerHandle};
pub use writer::{write_rows_batch, WriteRowsError};

// Re-export common types
pub use export_common::{
    config::TimescaleConfig,
    connection::{Database, PgDatabase, SqlStatement, TransactionError},
    error::{ConversionError, DatabaseError, UnknownExport, ValidationError},
    sql::DdlOptions,
    types::{ColumnType, ColumnValue, ExportDefinition, ExportId, RawExportDefinition, Record},
    validation::validate_export,
};
