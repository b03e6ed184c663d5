//! Service wiring: catalog, table manager and export worker

use anyhow::{Context, Result};
use export_common::{Database, PgDatabase};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

use crate::catalog::ExportCatalog;
use crate::config::ServiceConfig;
use crate::source::{RecordSource, SyncOutcome};
use crate::table_manager::{TableManager, TableManagerHandle, TableQueue};
use crate::worker::{ExportWorker, WorkerError, WorkerHandle};

/// Running export worker and table manager sharing one catalog.
///
/// Each component runs on its own database connection. Supervisors poll
/// [`ExportService::is_alive`] and shut the process down once either
/// component has stopped.
pub struct ExportService {
    catalog: Arc<ExportCatalog>,
    table_manager: TableManagerHandle,
    worker: WorkerHandle,
}

impl ExportService {
    /// Start both components on the given connections
    pub fn start(
        config: ServiceConfig,
        catalog: Arc<ExportCatalog>,
        source: Box<dyn RecordSource>,
        sync: oneshot::Receiver<SyncOutcome>,
        worker_db: Box<dyn Database>,
        table_manager_db: Box<dyn Database>,
    ) -> Self {
        let table_manager = TableManager::start(
            table_manager_db,
            catalog.clone(),
            config.table_manager,
            config.timescale.ddl_options(),
        );
        catalog.attach_table_queue(table_manager.queue());

        let worker = ExportWorker::new(source, catalog.clone(), worker_db, config.worker).start(sync);
        info!("Export service started");

        Self {
            catalog,
            table_manager,
            worker,
        }
    }

    /// Open both TimescaleDB connections, then start
    pub async fn connect(
        config: ServiceConfig,
        catalog: Arc<ExportCatalog>,
        source: Box<dyn RecordSource>,
        sync: oneshot::Receiver<SyncOutcome>,
    ) -> Result<Self> {
        let worker_db = PgDatabase::connect(&config.timescale, "export-worker")
            .await
            .context("Failed to connect export worker to TimescaleDB")?;
        let table_manager_db = PgDatabase::connect(&config.timescale, "table-manager")
            .await
            .context("Failed to connect table manager to TimescaleDB")?;

        Ok(Self::start(
            config,
            catalog,
            source,
            sync,
            Box::new(worker_db),
            Box::new(table_manager_db),
        ))
    }

    pub fn catalog(&self) -> Arc<ExportCatalog> {
        self.catalog.clone()
    }

    pub fn table_queue(&self) -> TableQueue {
        self.table_manager.queue()
    }

    /// True while both components run
    pub fn is_alive(&self) -> bool {
        self.worker.is_alive() && self.table_manager.is_alive()
    }

    pub fn stop(&self) {
        info!("Stopping export service");
        self.worker.stop();
        self.table_manager.stop();
    }

    /// Wait for both components; returns the worker's fatal error, if any
    pub async fn join(self) -> Result<(), WorkerError> {
        let result = self.worker.join().await;
        self.table_manager.join().await;
        result
    }
}
