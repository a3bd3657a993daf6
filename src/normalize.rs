//! Applies a [`FieldMapping`] to raw records, producing [`UnifiedEmployee`]s.
//!
//! For each `(source_field, target)` pair the target takes
//! `record[source_field]`; a field absent from the record becomes null.
//! Targets never mentioned by the mapping stay unset. Validation happens
//! once all pairs are applied: `employee_id` and `name` must end up
//! non-null.

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{FieldMapping, RawRecord, UnifiedEmployee, UnifiedField};

/// Normalize one record. Fails with [`Error::Validation`] when a required
/// field is missing or a value has the wrong shape.
pub fn normalize(record: &RawRecord, mapping: &FieldMapping) -> Result<UnifiedEmployee> {
    let mut employee_id = None;
    let mut name = None;
    let mut salary = None;
    let mut email = None;
    let mut department = None;
    let mut location = None;

    for (source_field, target) in mapping.iter() {
        let value = record.get(source_field).unwrap_or(&Value::Null);
        match target {
            UnifiedField::EmployeeId => employee_id = as_text(target, value)?,
            UnifiedField::Name => name = as_text(target, value)?,
            UnifiedField::Salary => salary = as_number(value)?,
            UnifiedField::Email => email = as_text(target, value)?,
            UnifiedField::Department => department = as_text(target, value)?,
            UnifiedField::Location => location = as_text(target, value)?,
        }
    }

    Ok(UnifiedEmployee {
        employee_id: employee_id
            .ok_or_else(|| Error::Validation("employee_id is required".to_string()))?,
        name: name.ok_or_else(|| Error::Validation("name is required".to_string()))?,
        salary,
        email,
        department,
        location,
    })
}

/// Normalize a batch, skipping (and logging) records that fail validation.
pub fn normalize_batch(
    source: &str,
    records: &[RawRecord],
    mapping: &FieldMapping,
) -> Vec<UnifiedEmployee> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match normalize(record, mapping) {
            Ok(employee) => Some(employee),
            Err(e) => {
                warn!(source, index, error = %e, "skipping record");
                None
            }
        })
        .collect()
}

/// Text fields accept strings, numbers and booleans. Blank strings are absent.
fn as_text(field: UnifiedField, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(Error::Validation(format!(
            "{} must be a scalar value",
            field
        ))),
    }
}

/// Salary accepts numbers and numeric strings (CSV cells arrive as text).
fn as_number(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::Validation("salary is out of range".to_string())),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| Error::Validation(format!("salary is not a number: {}", s))),
        _ => Err(Error::Validation("salary must be a number".to_string())),
    }
}
