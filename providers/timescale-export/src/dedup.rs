//! Latest-wins deduplication on the time column

use chrono::{DateTime, NaiveDateTime, Utc};
use export_common::ColumnValue;
use std::collections::HashSet;

use crate::batch::{ColumnGroup, RowsBatch, TableBatch};

/// Hashable view of a time-column value
#[derive(Debug, PartialEq, Eq, Hash)]
enum TimeKey {
    Null,
    Bool(bool),
    Int(i64),
    /// IEEE bits, with -0.0 folded into 0.0
    Float(u64),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl From<&ColumnValue> for TimeKey {
    fn from(value: &ColumnValue) -> Self {
        match value {
            ColumnValue::Null => TimeKey::Null,
            ColumnValue::Bool(v) => TimeKey::Bool(*v),
            ColumnValue::SmallInt(v) => TimeKey::Int(i64::from(*v)),
            ColumnValue::Integer(v) => TimeKey::Int(i64::from(*v)),
            ColumnValue::BigInt(v) => TimeKey::Int(*v),
            ColumnValue::Real(v) => float_key(f64::from(*v)),
            ColumnValue::Double(v) => float_key(*v),
            ColumnValue::Text(v) => TimeKey::Text(v.clone()),
            ColumnValue::Timestamp(v) => TimeKey::Timestamp(*v),
            ColumnValue::TimestampTz(v) => TimeKey::TimestampTz(*v),
        }
    }
}

fn float_key(v: f64) -> TimeKey {
    let v = if v == 0.0 { 0.0 } else { v };
    TimeKey::Float(v.to_bits())
}

impl TableBatch {
    /// Keep only the most recently arrived row per time value.
    ///
    /// Walks groups and rows from the end, so the first occurrence seen is
    /// the latest one. Surviving rows keep their relative order; groups left
    /// empty are dropped. No-op without a unique time column.
    pub fn deduplicate(&mut self) {
        let Some(time_column) = self.unique_time_column.as_deref() else {
            return;
        };

        let mut kept = HashSet::new();
        let mut groups = Vec::with_capacity(self.groups.len());

        for mut group in self.groups.drain(..).rev() {
            let Some(position) = group.columns.iter().position(|c| c == time_column) else {
                // Rows without a time value cannot collide
                groups.push(group);
                continue;
            };

            let mut rows: Vec<_> = group
                .rows
                .drain(..)
                .rev()
                .filter(|row| kept.insert(TimeKey::from(&row[position])))
                .collect();

            if rows.is_empty() {
                continue;
            }
            rows.reverse();
            groups.push(ColumnGroup {
                columns: group.columns,
                rows,
            });
        }

        groups.reverse();
        self.groups = groups;
    }
}

/// Deduplicate every table that keeps one row per time value
pub fn deduplicate_rows_batch(batch: &mut RowsBatch) {
    for table in batch.values_mut() {
        table.deduplicate();
    }
}
