//! Table lifecycle manager
//!
//! A single tokio task owns its own database connection and applies table
//! creates and drops in queue order. Callers enqueue and return at once.
//! Connectivity failures are retried with an interruptible delay; any
//! other failure, or exhausted retries, stops the manager for good and
//! leaves recovery to whoever supervises [`TableManagerHandle::is_alive`].

use export_common::sql::{create_table_sql, drop_table_sql};
use export_common::{
    sleep_or_cancel, Database, DatabaseError, DdlOptions, ExportId, RetryState, UnknownExport,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TableManagerConfig;
use crate::source::ExportResolver;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableManagerError {
    #[error("failed to create table for export {export_id}: {cause}")]
    CreateTable {
        export_id: ExportId,
        #[source]
        cause: DatabaseError,
    },

    #[error("failed to drop table for export {export_id}: {cause}")]
    DropTable {
        export_id: ExportId,
        #[source]
        cause: DatabaseError,
    },

    #[error(transparent)]
    UnknownExport(#[from] UnknownExport),
}

/// Queued DDL work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOperation {
    Create(ExportId),
    Drop {
        export_id: ExportId,
        /// Known at enqueue time when the definition is already gone
        table_name: Option<String>,
    },
}

/// Cloneable sender side of the manager's queue
#[derive(Debug, Clone)]
pub struct TableQueue {
    tx: mpsc::UnboundedSender<TableOperation>,
}

impl TableQueue {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TableOperation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue_create(&self, export_id: impl Into<ExportId>) {
        self.send(TableOperation::Create(export_id.into()));
    }

    /// Drop the export's table, resolving its name when the drop runs
    pub fn enqueue_drop(&self, export_id: impl Into<ExportId>) {
        self.send(TableOperation::Drop {
            export_id: export_id.into(),
            table_name: None,
        });
    }

    pub fn enqueue_drop_table(&self, export_id: impl Into<ExportId>, table_name: impl Into<String>) {
        self.send(TableOperation::Drop {
            export_id: export_id.into(),
            table_name: Some(table_name.into()),
        });
    }

    fn send(&self, operation: TableOperation) {
        if let Err(e) = self.tx.send(operation) {
            warn!("Table manager is stopped, discarding {:?}", e.0);
        }
    }
}

pub struct TableManager {
    db: Box<dyn Database>,
    resolver: Arc<dyn ExportResolver>,
    config: TableManagerConfig,
    ddl_options: DdlOptions,
    cancel: CancellationToken,
}

impl TableManager {
    /// Spawn the manager task
    pub fn start(
        db: Box<dyn Database>,
        resolver: Arc<dyn ExportResolver>,
        config: TableManagerConfig,
        ddl_options: DdlOptions,
    ) -> TableManagerHandle {
        let (queue, rx) = TableQueue::channel();
        let cancel = CancellationToken::new();

        let manager = TableManager {
            db,
            resolver,
            config,
            ddl_options,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(manager.run(rx));

        TableManagerHandle {
            queue,
            cancel,
            task,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<TableOperation>) {
        info!("Table manager started");

        while !self.cancel.is_cancelled() {
            let operation = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = timeout(self.config.timeout, rx.recv()) => match received {
                    Ok(Some(operation)) => operation,
                    Ok(None) => {
                        info!("Table queue closed");
                        break;
                    }
                    // Idle; loop around to re-check for a stop request
                    Err(_) => continue,
                },
            };

            match self.execute(operation).await {
                Ok(()) => {}
                Err(TableManagerError::UnknownExport(e)) => {
                    debug!("Skipping table operation: {}", e);
                }
                Err(e) => {
                    error!(error = %e, "Table manager stopping on fatal error");
                    break;
                }
            }
        }

        info!("Table manager stopped");
    }

    async fn execute(&mut self, operation: TableOperation) -> Result<(), TableManagerError> {
        match operation {
            TableOperation::Create(export_id) => self.create(export_id).await,
            TableOperation::Drop {
                export_id,
                table_name,
            } => self.drop_table(export_id, table_name).await,
        }
    }

    #[instrument(skip(self))]
    async fn create(&mut self, export_id: ExportId) -> Result<(), TableManagerError> {
        let export = self.resolver.resolve(&export_id)?;
        let sql = create_table_sql(&export, &self.ddl_options);

        match self.execute_ddl(&sql).await {
            Ok(true) => {
                info!("Created table {}", export.table_name());
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(cause) => Err(TableManagerError::CreateTable { export_id, cause }),
        }
    }

    #[instrument(skip(self))]
    async fn drop_table(
        &mut self,
        export_id: ExportId,
        table_name: Option<String>,
    ) -> Result<(), TableManagerError> {
        let table_name = match table_name {
            Some(name) => name,
            None => self.resolver.resolve(&export_id)?.table_name().to_string(),
        };

        match self.execute_ddl(&drop_table_sql(&table_name)).await {
            Ok(true) => {
                info!("Dropped table {}", table_name);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(cause) => Err(TableManagerError::DropTable { export_id, cause }),
        }
    }

    /// Run one DDL script, retrying connectivity failures.
    /// Returns false when a stop request interrupted the retry wait.
    async fn execute_ddl(&mut self, sql: &str) -> Result<bool, DatabaseError> {
        let mut retry = RetryState::new(&self.config.retry_config());

        loop {
            let err = match self.db.batch_execute(sql).await {
                Ok(()) => return Ok(true),
                Err(e) => e,
            };

            let Some(delay) = retry.next_delay(&err) else {
                return Err(err);
            };
            if !sleep_or_cancel(&self.cancel, delay).await {
                debug!("Stop requested during retry wait");
                return Ok(false);
            }
        }
    }
}

/// Control surface of a running [`TableManager`]
pub struct TableManagerHandle {
    queue: TableQueue,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TableManagerHandle {
    pub fn enqueue_create(&self, export_id: impl Into<ExportId>) {
        self.queue.enqueue_create(export_id);
    }

    pub fn enqueue_drop(&self, export_id: impl Into<ExportId>) {
        self.queue.enqueue_drop(export_id);
    }

    /// Sender for other callers
    pub fn queue(&self) -> TableQueue {
        self.queue.clone()
    }

    /// Request termination; wakes any queue or retry wait
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Table manager task failed: {}", e);
        }
    }
}
