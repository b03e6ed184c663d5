//! Core types shared by the export worker and the table manager
//!
//! An export definition arrives from the filtering subsystem in its raw
//! serde form ([`RawExportDefinition`]) and only becomes an
//! [`ExportDefinition`] after passing [`crate::validation::validate_export`].

use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::converter::TimeFormat;

/// Opaque export identifier owned by the filtering subsystem
pub type ExportId = String;

/// Column types an export may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "TIMESTAMP")]
    Timestamp,
    #[serde(rename = "TIMESTAMPTZ")]
    TimestampTz,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "real")]
    Real,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "smallint")]
    SmallInt,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "bigint")]
    BigInt,
    #[serde(rename = "varchar")]
    Varchar,
    #[serde(rename = "text")]
    Text,
}

impl ColumnType {
    /// Every recognized type, in vocabulary order
    pub const ALL: [ColumnType; 10] = [
        ColumnType::Timestamp,
        ColumnType::TimestampTz,
        ColumnType::Bool,
        ColumnType::Real,
        ColumnType::Double,
        ColumnType::SmallInt,
        ColumnType::Integer,
        ColumnType::BigInt,
        ColumnType::Varchar,
        ColumnType::Text,
    ];

    /// Resolve a declared type tag. Tags match exactly.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Tag as it appears in export definitions
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::TimestampTz => "TIMESTAMPTZ",
            ColumnType::Bool => "bool",
            ColumnType::Real => "real",
            ColumnType::Double => "double",
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Varchar => "varchar",
            ColumnType::Text => "text",
        }
    }

    /// PostgreSQL type used in CREATE TABLE
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::TimestampTz => "TIMESTAMPTZ",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Export definition as delivered by the filtering subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExportDefinition {
    pub table_name: String,
    /// Each entry is `[name, type, modifiers...]`
    pub table_columns: Vec<Vec<String>>,
    pub time_column: String,
    #[serde(default)]
    pub time_format: Option<String>,
    #[serde(default)]
    pub time_unique: bool,
    /// `"<column>:<kind>"` → source path
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

/// One declared destination column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    /// Raw DDL appended after the type, e.g. `NOT NULL`
    pub modifiers: Vec<String>,
}

/// Validated export definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportDefinition {
    table_name: String,
    columns: Vec<ColumnSpec>,
    time_column: String,
    time_format: Option<TimeFormat>,
    time_unique: bool,
}

impl ExportDefinition {
    /// Only the validator builds definitions
    pub(crate) fn new(
        table_name: String,
        columns: Vec<ColumnSpec>,
        time_column: String,
        time_format: Option<TimeFormat>,
        time_unique: bool,
    ) -> Self {
        Self {
            table_name,
            columns,
            time_column,
            time_format,
            time_unique,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn time_format(&self) -> Option<&TimeFormat> {
        self.time_format.as_ref()
    }

    /// Time column name when the table keeps one row per timestamp
    pub fn unique_time_column(&self) -> Option<&str> {
        self.time_unique.then_some(self.time_column.as_str())
    }
}

/// One decoded input message
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Exports this record matched (or would have matched)
    pub export_ids: Vec<ExportId>,
    pub payload: RecordPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    /// Extracted field mapping
    Data(Map<String, Value>),
    /// Decoding or matching failed
    Failed(String),
}

impl Record {
    pub fn data(export_ids: Vec<ExportId>, data: Map<String, Value>) -> Self {
        Self {
            export_ids,
            payload: RecordPayload::Data(data),
        }
    }

    pub fn failed(export_ids: Vec<ExportId>, reason: impl Into<String>) -> Self {
        Self {
            export_ids,
            payload: RecordPayload::Failed(reason.into()),
        }
    }
}

/// Typed column value bound as a statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

/// Ordered values, one per present column
pub type Row = Vec<ColumnValue>;

impl ToSql for ColumnValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            ColumnValue::Null => Ok(IsNull::Yes),
            ColumnValue::Bool(v) => v.to_sql(ty, out),
            ColumnValue::SmallInt(v) => v.to_sql(ty, out),
            ColumnValue::Integer(v) => v.to_sql(ty, out),
            ColumnValue::BigInt(v) => v.to_sql(ty, out),
            ColumnValue::Real(v) => v.to_sql(ty, out),
            ColumnValue::Double(v) => v.to_sql(ty, out),
            ColumnValue::Text(v) => v.to_sql(ty, out),
            ColumnValue::Timestamp(v) => v.to_sql(ty, out),
            ColumnValue::TimestampTz(v) => v.to_sql(ty, out),
        }
    }

    // Each variant checks its own type in to_sql
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
