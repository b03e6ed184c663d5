//! Paged transactional writes
//!
//! A cycle's rows go out as multi-row parameterized INSERTs, at most
//! `page_size` rows each, and commit together in one transaction. Pages
//! shrink further on wide tables to stay under PostgreSQL's bind
//! parameter limit.

use export_common::sql::insert_rows_sql;
use export_common::{Database, DatabaseError, ExportId, SqlStatement};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::batch::{total_rows, RowsBatch};

/// Write failure; fatal to the export worker
#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to write {rows} rows for export {export_id}: {cause}")]
pub struct WriteRowsError {
    pub rows: usize,
    pub export_id: ExportId,
    #[source]
    pub cause: DatabaseError,
}

/// PostgreSQL's per-statement bind parameter limit
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

/// Statement with the rows and export it writes for
struct PlannedStatement {
    statement: SqlStatement,
    rows: usize,
    export_id: ExportId,
}

/// Rows per INSERT for a group of `columns` columns
fn rows_per_page(page_size: usize, columns: usize) -> usize {
    let limit = MAX_BIND_PARAMETERS / columns.max(1);
    page_size.min(limit).max(1)
}

fn plan_statements(batch: RowsBatch, page_size: usize) -> Vec<PlannedStatement> {
    let mut planned = Vec::new();

    for (table_name, table) in batch {
        for group in table.groups {
            let rows_per_page = rows_per_page(page_size, group.columns.len());
            if rows_per_page < page_size {
                debug!(
                    "Limiting {} pages to {} rows for {} columns",
                    table_name,
                    rows_per_page,
                    group.columns.len()
                );
            }
            for page in group.rows.chunks(rows_per_page) {
                let sql = insert_rows_sql(&table_name, &group.columns, page.len());
                let params = page.iter().flatten().cloned().collect();
                planned.push(PlannedStatement {
                    statement: SqlStatement { sql, params },
                    rows: page.len(),
                    export_id: table.export_id.clone(),
                });
            }
        }
    }

    planned
}

/// Write every row of `batch` in one transaction.
///
/// Returns the number of rows written. On failure nothing is committed and
/// the error names the failing statement's rows and export, or the whole
/// cycle when begin/commit failed.
#[instrument(skip(db, batch))]
pub async fn write_rows_batch(
    db: &mut dyn Database,
    batch: RowsBatch,
    page_size: usize,
) -> Result<usize, WriteRowsError> {
    let total = total_rows(&batch);
    if total == 0 {
        return Ok(0);
    }

    let planned = plan_statements(batch, page_size);
    let statements: Vec<SqlStatement> = planned.iter().map(|p| p.statement.clone()).collect();
    debug!(
        "Writing {} rows in {} statements",
        total,
        statements.len()
    );

    match db.execute_in_transaction(&statements).await {
        Ok(_) => Ok(total),
        Err(e) => {
            let failed = e.statement.and_then(|index| planned.get(index));
            let (rows, export_id) = match failed {
                Some(p) => (p.rows, p.export_id.clone()),
                None => (
                    total,
                    planned
                        .first()
                        .map(|p| p.export_id.clone())
                        .unwrap_or_default(),
                ),
            };
            Err(WriteRowsError {
                rows,
                export_id,
                cause: e.error,
            })
        }
    }
}
