//! Export definition validation
//!
//! Gatekeeps definitions before they are accepted: a definition that
//! fails any check is rejected whole, so malformed schemas never reach DDL
//! generation or row coercion.

use std::collections::HashSet;

use crate::converter::TimeFormat;
use crate::error::ValidationError;
use crate::types::{ColumnSpec, ColumnType, ExportDefinition, RawExportDefinition};

/// Mapping kind whose keys must name declared columns
pub const DATA_MAPPING_KIND: &str = "data";

/// Validate a raw definition and produce its typed form
pub fn validate_export(raw: RawExportDefinition) -> Result<ExportDefinition, ValidationError> {
    if raw.table_name.trim().is_empty() {
        return Err(ValidationError::EmptyTableName);
    }
    if raw.table_columns.is_empty() {
        return Err(ValidationError::NoColumns);
    }

    let mut seen = HashSet::new();
    for column in &raw.table_columns {
        match column.first() {
            Some(name) if column.len() >= 2 && !name.is_empty() => {
                if !seen.insert(name.as_str()) {
                    return Err(ValidationError::DuplicateColumn(name.clone()));
                }
            }
            _ => return Err(ValidationError::MalformedColumn(column.clone())),
        }
    }

    let columns = raw
        .table_columns
        .iter()
        .map(|column| {
            let column_type = ColumnType::from_tag(&column[1]).ok_or_else(|| {
                ValidationError::UnknownColumnType {
                    column: column[0].clone(),
                    type_name: column[1].clone(),
                }
            })?;
            Ok(ColumnSpec {
                name: column[0].clone(),
                column_type,
                modifiers: column[2..].to_vec(),
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    if !seen.contains(raw.time_column.as_str()) {
        return Err(ValidationError::TimeColumnNotDeclared(raw.time_column));
    }

    for key in raw.mappings.keys() {
        let (column, kind) = split_mapping_key(key)?;
        if kind == DATA_MAPPING_KIND && !seen.contains(column) {
            return Err(ValidationError::UnknownMappingColumn {
                key: key.clone(),
                column: column.to_string(),
            });
        }
    }

    Ok(ExportDefinition::new(
        raw.table_name,
        columns,
        raw.time_column,
        raw.time_format.as_deref().map(TimeFormat::parse),
        raw.time_unique,
    ))
}

/// Split `"<column>:<kind>"`; exactly one separator is allowed
fn split_mapping_key(key: &str) -> Result<(&str, &str), ValidationError> {
    let mut parts = key.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), Some(kind), None) => Ok((column, kind)),
        _ => Err(ValidationError::MalformedMappingKey(key.to_string())),
    }
}

impl TryFrom<RawExportDefinition> for ExportDefinition {
    type Error = ValidationError;

    fn try_from(raw: RawExportDefinition) -> Result<Self, Self::Error> {
        validate_export(raw)
    }
}
