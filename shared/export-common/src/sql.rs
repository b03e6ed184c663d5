//! SQL generation for export tables
//!
//! Identifiers are always double-quoted; values never appear inline in
//! DML, only as `$n` parameters.

use serde::{Deserialize, Serialize};

use crate::types::{ColumnSpec, ExportDefinition};

/// TimescaleDB features applied when creating a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlOptions {
    /// Convert new tables into hypertables partitioned on the time column
    pub hypertables: bool,
    /// Multi-node deployment: set a replication factor after conversion
    pub distributed_hypertables: bool,
    pub replication_factor: u32,
}

impl Default for DdlOptions {
    fn default() -> Self {
        Self {
            hypertables: true,
            distributed_hypertables: false,
            replication_factor: 2,
        }
    }
}

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_def(column: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.column_type.sql_type());
    for modifier in &column.modifiers {
        def.push(' ');
        def.push_str(modifier);
    }
    def
}

/// Idempotent CREATE TABLE plus the configured TimescaleDB conversions,
/// as one script for a single `batch_execute` call.
pub fn create_table_sql(export: &ExportDefinition, options: &DdlOptions) -> String {
    let table = quote_ident(export.table_name());
    let columns = export
        .columns()
        .iter()
        .map(column_def)
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("CREATE TABLE IF NOT EXISTS {} ({});", table, columns);

    if options.hypertables {
        sql.push_str(&format!(
            " SELECT create_hypertable({}, {}, if_not_exists => TRUE);",
            quote_literal(&table),
            quote_literal(export.time_column())
        ));

        if options.distributed_hypertables {
            sql.push_str(&format!(
                " SELECT set_replication_factor({}, {});",
                quote_literal(&table),
                options.replication_factor
            ));
        }
    }

    sql
}

pub fn drop_table_sql(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table_name))
}

/// Multi-row parameterized INSERT for `row_count` rows of `columns`
pub fn insert_rows_sql(table_name: &str, columns: &[String], row_count: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let width = columns.len();
    let values = (0..row_count)
        .map(|row| {
            let placeholders = (1..=width)
                .map(|col| format!("${}", row * width + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", placeholders)
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table_name),
        column_list,
        values
    )
}
