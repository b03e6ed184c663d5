//! Export worker: poll, materialize, deduplicate, write, advance offsets

use export_common::Database;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::batch::{generate_rows_batch, total_rows};
use crate::config::WorkerConfig;
use crate::dedup::deduplicate_rows_batch;
use crate::source::{ExportResolver, PollBatch, RecordSource, SourceError, SyncOutcome};
use crate::writer::{write_rows_batch, WriteRowsError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("initial synchronization failed: {0}")]
    SyncFailed(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Write(#[from] WriteRowsError),

    #[error("export worker task failed: {0}")]
    Task(String),
}

pub struct ExportWorker {
    source: Box<dyn RecordSource>,
    resolver: Arc<dyn ExportResolver>,
    db: Box<dyn Database>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl ExportWorker {
    pub fn new(
        source: Box<dyn RecordSource>,
        resolver: Arc<dyn ExportResolver>,
        db: Box<dyn Database>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            source,
            resolver,
            db,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the worker through an externally owned token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Spawn [`ExportWorker::run`] on the runtime
    pub fn start(self, sync: oneshot::Receiver<SyncOutcome>) -> WorkerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run(sync));
        WorkerHandle { cancel, task }
    }

    /// Wait for the initial sync, then consume until stopped or a fatal
    /// error. A dropped sync sender counts as a failed sync.
    #[instrument(skip_all)]
    pub async fn run(mut self, sync: oneshot::Receiver<SyncOutcome>) -> Result<(), WorkerError> {
        info!("Waiting for initial synchronization");
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                info!("Stop requested before initial synchronization");
                return Ok(());
            }
            outcome = sync => outcome
                .unwrap_or_else(|_| SyncOutcome::Failed("sync signal dropped".to_string())),
        };

        if let SyncOutcome::Failed(reason) = outcome {
            error!("Initial synchronization failed, not consuming: {}", reason);
            return Err(WorkerError::SyncFailed(reason));
        }

        info!("Starting export consumption");
        while !self.cancel.is_cancelled() {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Export worker stopping on fatal error");
                return Err(e);
            }
        }

        info!("Export worker stopped");
        Ok(())
    }

    /// One poll, write and offset advance
    async fn run_cycle(&mut self) -> Result<(), WorkerError> {
        let polled = self
            .source
            .poll(self.config.poll_timeout, self.config.poll_limit, true)
            .await?;
        let Some(PollBatch { records, errors }) = polled else {
            return Ok(());
        };

        for err in errors {
            if self.config.ignored_error_codes.contains(&err.code) {
                warn!(code = err.code, "Ignoring record source error: {}", err.message);
            } else {
                return Err(SourceError::from(err).into());
            }
        }

        if records.is_empty() {
            return Ok(());
        }

        let cycle_id = Uuid::new_v4();
        let mut batch = generate_rows_batch(&records, self.resolver.as_ref());
        deduplicate_rows_batch(&mut batch);
        debug!(
            cycle_id = %cycle_id,
            records = records.len(),
            tables = batch.len(),
            "Writing {} rows",
            total_rows(&batch)
        );

        let written = write_rows_batch(self.db.as_mut(), batch, self.config.page_size).await?;
        self.source.advance_offsets().await?;
        debug!(cycle_id = %cycle_id, "Committed {} rows", written);
        Ok(())
    }
}

/// Control surface of a running [`ExportWorker`]
pub struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the worker to exit and return its fatal error, if any
    pub async fn join(self) -> Result<(), WorkerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Export worker task failed: {}", e);
                Err(WorkerError::Task(e.to_string()))
            }
        }
    }
}
