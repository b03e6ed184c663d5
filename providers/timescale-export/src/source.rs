//! Interfaces consumed from the filtering subsystem
//!
//! The worker never decodes messages itself: a [`RecordSource`] delivers
//! already-matched records and an [`ExportResolver`] answers definition
//! lookups by export id.

use async_trait::async_trait;
use export_common::{ExportDefinition, ExportId, Record, UnknownExport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Export definition lookup
pub trait ExportResolver: Send + Sync {
    fn resolve(&self, export_id: &ExportId) -> Result<Arc<ExportDefinition>, UnknownExport>;
}

/// Batch-level error reported alongside a poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub code: i32,
    pub message: String,
}

impl BatchError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Result of one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    pub records: Vec<Record>,
    pub errors: Vec<BatchError>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("record source error {code}: {message}")]
    Batch { code: i32, message: String },

    #[error("record source failed: {0}")]
    Failed(String),
}

impl From<BatchError> for SourceError {
    fn from(err: BatchError) -> Self {
        SourceError::Batch {
            code: err.code,
            message: err.message,
        }
    }
}

/// Consumer of the upstream stream
#[async_trait]
pub trait RecordSource: Send {
    /// Wait up to `timeout` for at most `max_count` records.
    /// `Ok(None)` means nothing arrived.
    async fn poll(
        &mut self,
        timeout: Duration,
        max_count: usize,
        ignore_missing_keys: bool,
    ) -> Result<Option<PollBatch>, SourceError>;

    /// Commit consumption of everything polled so far
    async fn advance_offsets(&mut self) -> Result<(), SourceError>;
}

/// Outcome of the upstream initial synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Ready,
    Failed(String),
}
