//! Row materialization and per-table grouping
//!
//! One poll's records become a [`RowsBatch`]: per destination table, an
//! ordered run of [`ColumnGroup`]s whose rows share the same present
//! columns. Group order is arrival order; the deduplicator depends on it.

use export_common::{ExportDefinition, ExportId, Record, RecordPayload, Row};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::source::ExportResolver;

/// Consecutive rows sharing one present-column tuple
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroup {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Everything one cycle writes into a single table
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    /// First export that produced rows for the table; used in error reports
    pub export_id: ExportId,
    /// Set when the table keeps one row per time value
    pub unique_time_column: Option<String>,
    pub groups: Vec<ColumnGroup>,
}

impl TableBatch {
    pub fn new(export_id: ExportId, unique_time_column: Option<String>) -> Self {
        Self {
            export_id,
            unique_time_column,
            groups: Vec::new(),
        }
    }

    /// Append to the last group when its columns match, else open a new one
    pub fn push_row(&mut self, columns: Vec<String>, row: Row) {
        match self.groups.last_mut() {
            Some(group) if group.columns == columns => group.rows.push(row),
            _ => self.groups.push(ColumnGroup {
                columns,
                rows: vec![row],
            }),
        }
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }
}

/// Table name → rows to write this cycle
pub type RowsBatch = BTreeMap<String, TableBatch>;

pub fn total_rows(batch: &RowsBatch) -> usize {
    batch.values().map(TableBatch::row_count).sum()
}

/// Build the per-table row groups for one poll's records.
///
/// Failed records, unknown exports and rows that fail coercion are
/// skipped; none of them abort the batch.
pub fn generate_rows_batch(records: &[Record], resolver: &dyn ExportResolver) -> RowsBatch {
    let mut batch = RowsBatch::new();

    for record in records {
        let data = match &record.payload {
            RecordPayload::Data(data) => data,
            RecordPayload::Failed(reason) => {
                error!(
                    export_ids = ?record.export_ids,
                    "Skipping record that failed decoding: {}", reason
                );
                continue;
            }
        };

        for export_id in &record.export_ids {
            let export = match resolver.resolve(export_id) {
                Ok(export) => export,
                Err(e) => {
                    debug!("Skipping record for export: {}", e);
                    continue;
                }
            };

            let (columns, row) = match build_row(&export, data) {
                Ok(Some(built)) => built,
                Ok(None) => {
                    debug!(
                        export_id = %export_id,
                        "Record carries none of the declared columns"
                    );
                    continue;
                }
                Err(e) => {
                    error!(export_id = %export_id, "Failed to convert record: {}", e);
                    continue;
                }
            };

            batch
                .entry(export.table_name().to_string())
                .or_insert_with(|| {
                    TableBatch::new(
                        export_id.clone(),
                        export.unique_time_column().map(str::to_string),
                    )
                })
                .push_row(columns, row);
        }
    }

    batch
}

/// Present columns in declared order and their coerced values
fn build_row(
    export: &ExportDefinition,
    data: &Map<String, Value>,
) -> Result<Option<(Vec<String>, Row)>, export_common::ConversionError> {
    let mut columns = Vec::new();
    let mut row = Row::new();

    for column in export.columns() {
        if let Some(value) = data.get(&column.name) {
            row.push(column.column_type.coerce(value, export.time_format())?);
            columns.push(column.name.clone());
        }
    }

    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some((columns, row)))
}
