//! Source loader trait and the process-wide loader registry.
//!
//! A loader is a named producer of [`RawRecord`]s. Built-in mock sources
//! live in [`crate::loader_static`]; uploaded CSV files become
//! [`crate::loader_csv::CsvLoader`]s registered at runtime.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             LoaderRegistry               │
//! │  ┌──────────┐ ┌────────────┐ ┌────────┐  │
//! │  │ FakeSAP  │ │FakeWorkday │ │  CSV   │  │
//! │  │ (static) │ │  (static)  │ │uploads │  │
//! │  └──────────┘ └────────────┘ └────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!    load() → infer mapping → normalize → upsert
//! ```
//!
//! # Usage
//!
//! ```rust
//! use synchub::loaders::LoaderRegistry;
//!
//! let registry = LoaderRegistry::with_builtins();
//! assert!(registry.get("FakeSAP").is_some());
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::loader_static::{FakeSapLoader, FakeWorkdayLoader};
use crate::models::RawRecord;

/// A source of raw employee records.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use synchub::error::Result;
/// use synchub::loaders::SourceLoader;
/// use synchub::models::RawRecord;
///
/// pub struct BambooLoader;
///
/// #[async_trait]
/// impl SourceLoader for BambooLoader {
///     fn name(&self) -> &str { "Bamboo" }
///
///     async fn load(&self) -> Result<Vec<RawRecord>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Stable identity key; unique within a [`LoaderRegistry`].
    fn name(&self) -> &str;

    /// One-line description shown by `synchub sources`.
    fn description(&self) -> &str {
        "custom source"
    }

    /// Produce the source's records in order.
    ///
    /// An empty or unset source returns an empty vector, not an error.
    async fn load(&self) -> Result<Vec<RawRecord>>;
}

/// Registry of loaders keyed by source name.
///
/// Registering a name that already exists replaces the previous loader
/// (last write wins); this is how re-uploading a CSV under the same source
/// name refreshes its data.
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn SourceLoader>>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Create a registry holding the FakeSAP and FakeWorkday mock sources.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FakeSapLoader);
        registry.register(FakeWorkdayLoader);
        registry
    }

    /// Create the registry described by `[sources]`.
    pub fn from_config(config: &Config) -> Self {
        if config.sources.builtin {
            Self::with_builtins()
        } else {
            Self::new()
        }
    }

    /// Add or replace the loader under its declared name and return the
    /// shared handle.
    pub fn register<L: SourceLoader + 'static>(&mut self, loader: L) -> Arc<dyn SourceLoader> {
        let handle: Arc<dyn SourceLoader> = Arc::new(loader);
        let name = handle.name().to_string();
        if self.loaders.insert(name.clone(), handle.clone()).is_some() {
            warn!(source = %name, "replaced existing loader");
        } else {
            info!(source = %name, "registered loader");
        }
        handle
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceLoader>> {
        self.loaders.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Remove a loader. Returns the removed handle; a no-op when absent.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn SourceLoader>> {
        let removed = self.loaders.remove(name);
        if removed.is_some() {
            info!(source = %name, "removed loader");
        }
        removed
    }

    /// All loaders, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn SourceLoader>> {
        let mut all: Vec<_> = self.loaders.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Registered source names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI entry point for `synchub sources`: list registered loaders.
pub async fn list_sources(config: &Config) -> anyhow::Result<()> {
    let registry = LoaderRegistry::from_config(config);
    if registry.is_empty() {
        println!("No sources registered. Enable [sources].builtin or import a CSV.");
        return Ok(());
    }

    println!("{:<16} {:>8}  DESCRIPTION", "SOURCE", "RECORDS");
    for loader in registry.all() {
        let count = match loader.load().await {
            Ok(records) => records.len().to_string(),
            Err(_) => "error".to_string(),
        };
        println!("{:<16} {:>8}  {}", loader.name(), count, loader.description());
    }
    Ok(())
}

/// Field names of the first record, in record order. Empty for an empty source.
pub fn sample_fields(records: &[RawRecord]) -> Vec<String> {
    records
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader_csv::CsvLoader;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_register_then_get_returns_same_loader() {
        let mut registry = LoaderRegistry::new();
        let handle = registry.register(FakeSapLoader);
        let found = registry.get("FakeSAP").unwrap();
        assert!(Arc::ptr_eq(&handle, &found));
    }

    #[tokio::test]
    async fn test_register_same_name_replaces() {
        let mut registry = LoaderRegistry::new();
        registry.register(CsvLoader::new(
            "Upload",
            vec![record(json!({"id": "1"})), record(json!({"id": "2"}))],
        ));
        registry.register(CsvLoader::new("Upload", vec![record(json!({"id": "9"}))]));

        assert_eq!(registry.len(), 1);
        let records = registry.get("Upload").unwrap().load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], json!("9"));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut registry = LoaderRegistry::with_builtins();
        assert!(registry.remove("Nope").is_none());
        assert_eq!(registry.len(), 2);
        assert!(registry.remove("FakeWorkday").is_some());
        assert_eq!(registry.names(), vec!["FakeSAP".to_string()]);
    }

    #[test]
    fn test_all_sorted_by_name() {
        let mut registry = LoaderRegistry::with_builtins();
        registry.register(CsvLoader::new("Acme", vec![]));
        let names: Vec<String> = registry.all().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["Acme", "FakeSAP", "FakeWorkday"]);
    }

    #[test]
    fn test_sample_fields_empty_source() {
        assert!(sample_fields(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_sample_fields_keep_header_order() {
        let loader = CsvLoader::from_csv("Upload", b"zeta,alpha,mid\n1,2,3\n").unwrap();
        let records = loader.load().await.unwrap();
        assert_eq!(sample_fields(&records), vec!["zeta", "alpha", "mid"]);
    }
}
