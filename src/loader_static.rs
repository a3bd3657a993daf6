//! Hardcoded mock HR sources used for demonstration and tests.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::loaders::SourceLoader;
use crate::models::RawRecord;

/// Mock SAP feed with `emp_*` style field names.
pub struct FakeSapLoader;

#[async_trait]
impl SourceLoader for FakeSapLoader {
    fn name(&self) -> &str {
        "FakeSAP"
    }

    fn description(&self) -> &str {
        "Mock SAP HR feed"
    }

    async fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(records(vec![
            json!({"emp_id": "001", "emp_sal": 12000, "emp_name": "Ramesh"}),
            json!({"emp_id": "002", "emp_sal": 10000, "emp_name": "Sita"}),
        ]))
    }
}

/// Mock Workday feed with short field names.
pub struct FakeWorkdayLoader;

#[async_trait]
impl SourceLoader for FakeWorkdayLoader {
    fn name(&self) -> &str {
        "FakeWorkday"
    }

    fn description(&self) -> &str {
        "Mock Workday HR feed"
    }

    async fn load(&self) -> Result<Vec<RawRecord>> {
        Ok(records(vec![
            json!({"id": "001", "name": "Ramesh", "sal": 12000}),
            json!({"id": "002", "name": "Sita", "sal": 10000}),
        ]))
    }
}

fn records(values: Vec<serde_json::Value>) -> Vec<RawRecord> {
    values
        .into_iter()
        .filter_map(|v| match v {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}
