//! CSV-backed source loader.
//!
//! Holds uploaded rows in memory. Each cell becomes a JSON string keyed by
//! its header; type coercion happens later in [`crate::normalize`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::loaders::SourceLoader;
use crate::models::RawRecord;

#[derive(Clone)]
pub struct CsvLoader {
    name: String,
    headers: Vec<String>,
    records: Vec<RawRecord>,
}

impl CsvLoader {
    pub fn new(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        let mut loader = Self {
            name: String::new(),
            headers: Vec::new(),
            records: Vec::new(),
        };
        loader.set_data(name, records);
        loader
    }

    /// Parse CSV bytes (header row first) into a loader named `name`.
    ///
    /// Fails with a validation error when there is no header or no data row.
    pub fn from_csv(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(Error::Validation("CSV file is empty".to_string()));
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let record: RawRecord = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
                .collect();
            records.push(record);
        }

        if records.is_empty() {
            return Err(Error::Validation("CSV file is empty".to_string()));
        }

        Ok(Self {
            name: name.into(),
            headers,
            records,
        })
    }

    /// Replace the source name and its entire record set in one step.
    pub fn set_data(&mut self, name: impl Into<String>, records: Vec<RawRecord>) {
        self.name = name.into();
        self.headers = records
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        self.records = records;
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new("CSV", Vec::new())
    }
}

#[async_trait]
impl SourceLoader for CsvLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Uploaded CSV file"
    }

    async fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}
