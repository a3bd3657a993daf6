//! Core data models used throughout SyncHub.
//!
//! Raw records come out of loaders with source-specific keys; a
//! [`FieldMapping`] translates them into [`UnifiedEmployee`]s, which are
//! persisted as [`EmployeeRow`]s.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// One record as produced by a loader: arbitrary field name to scalar value.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// The closed vocabulary of unified-schema field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedField {
    EmployeeId,
    Name,
    Salary,
    Email,
    Department,
    Location,
}

impl UnifiedField {
    pub const ALL: [UnifiedField; 6] = [
        UnifiedField::EmployeeId,
        UnifiedField::Name,
        UnifiedField::Salary,
        UnifiedField::Email,
        UnifiedField::Department,
        UnifiedField::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnifiedField::EmployeeId => "employee_id",
            UnifiedField::Name => "name",
            UnifiedField::Salary => "salary",
            UnifiedField::Email => "email",
            UnifiedField::Department => "department",
            UnifiedField::Location => "location",
        }
    }
}

impl fmt::Display for UnifiedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnifiedField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UnifiedField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown unified field: {}", s)))
    }
}

/// Translation table from source field names to unified field names.
///
/// Not required to be total in either direction. Entries are applied in
/// source-field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, UnifiedField>);

impl FieldMapping {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, source_field: impl Into<String>, target: UnifiedField) {
        self.0.insert(source_field.into(), target);
    }

    pub fn get(&self, source_field: &str) -> Option<UnifiedField> {
        self.0.get(source_field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UnifiedField)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, UnifiedField)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, UnifiedField)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A record in the unified schema. `employee_id` and `name` are guaranteed
/// non-empty by construction through [`crate::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEmployee {
    pub employee_id: String,
    pub name: String,
    pub salary: Option<f64>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
}

/// Persisted employee row: the unified record plus its surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeRow {
    pub id: i64,
    pub employee_id: String,
    pub name: String,
    pub salary: Option<f64>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
}

/// A logged natural-language question and the agent's answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    /// ISO 8601, server-assigned at write time.
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_field_roundtrip_names() {
        for field in UnifiedField::ALL {
            assert_eq!(field.as_str().parse::<UnifiedField>().unwrap(), field);
        }
        assert!("badge".parse::<UnifiedField>().is_err());
    }

    #[test]
    fn test_field_mapping_serializes_as_flat_object() {
        let mapping: FieldMapping = [
            ("emp_id", UnifiedField::EmployeeId),
            ("emp_sal", UnifiedField::Salary),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "emp_id": "employee_id", "emp_sal": "salary" })
        );
    }
}
