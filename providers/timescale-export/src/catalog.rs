//! In-memory export registry
//!
//! Definitions enter through [`ExportCatalog::install`], which validates
//! them first, and leave through [`ExportCatalog::remove`]. Both notify the
//! table manager once a queue is attached.

use dashmap::DashMap;
use export_common::{
    validate_export, ExportDefinition, ExportId, RawExportDefinition, UnknownExport,
    ValidationError,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::source::ExportResolver;
use crate::table_manager::TableQueue;

#[derive(Default)]
pub struct ExportCatalog {
    exports: DashMap<ExportId, Arc<ExportDefinition>>,
    table_queue: RwLock<Option<TableQueue>>,
}

impl ExportCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route table creates and drops to a running table manager.
    /// Exports installed before attachment get their creates now.
    pub fn attach_table_queue(&self, queue: TableQueue) {
        let mut slot = self.table_queue.write();
        for entry in self.exports.iter() {
            queue.enqueue_create(entry.key().clone());
        }
        *slot = Some(queue);
    }

    /// Validate and store a definition, then request its table.
    /// A rejected definition leaves any previous one in place.
    pub fn install(
        &self,
        export_id: impl Into<ExportId>,
        raw: RawExportDefinition,
    ) -> Result<Arc<ExportDefinition>, ValidationError> {
        let export_id = export_id.into();
        let export = match validate_export(raw) {
            Ok(export) => Arc::new(export),
            Err(e) => {
                warn!(export_id = %export_id, "Rejected export definition: {}", e);
                return Err(e);
            }
        };

        self.exports.insert(export_id.clone(), export.clone());
        info!(
            export_id = %export_id,
            "Installed export for table {}",
            export.table_name()
        );

        if let Some(queue) = self.table_queue.read().as_ref() {
            queue.enqueue_create(export_id);
        }
        Ok(export)
    }

    /// Forget a definition and request its table drop
    pub fn remove(&self, export_id: &str) -> Option<Arc<ExportDefinition>> {
        let (export_id, export) = self.exports.remove(export_id)?;
        info!(export_id = %export_id, "Removed export");

        if let Some(queue) = self.table_queue.read().as_ref() {
            queue.enqueue_drop_table(export_id, export.table_name());
        }
        Some(export)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl ExportResolver for ExportCatalog {
    fn resolve(&self, export_id: &ExportId) -> Result<Arc<ExportDefinition>, UnknownExport> {
        self.exports
            .get(export_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| UnknownExport(export_id.clone()))
    }
}
