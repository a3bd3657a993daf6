//! Ingestion pipeline orchestration.
//!
//! Coordinates the sync flow: loader → field mapping → normalization →
//! upsert. Shared by the CLI (`synchub sync`, `synchub import`) and the HTTP
//! server.
//!
//! Per-record validation failures are skipped and logged. Mapping failures
//! abort the whole call. Persistence happens once per call, in one
//! transaction, so a database error leaves nothing from the call behind.

use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::llm::create_model;
use crate::loader_csv::CsvLoader;
use crate::loaders::{sample_fields, LoaderRegistry, SourceLoader};
use crate::mapper::FieldMapper;
use crate::migrate;
use crate::models::{FieldMapping, RawRecord, UnifiedEmployee};
use crate::normalize::normalize_batch;
use crate::store;

/// One source's records after mapping and normalization.
#[derive(Debug, Clone, Serialize)]
pub struct SourceBatch {
    pub source: String,
    pub fetched: usize,
    pub mapping: FieldMapping,
    pub employees: Vec<UnifiedEmployee>,
}

impl SourceBatch {
    /// Records dropped by validation.
    pub fn skipped(&self) -> usize {
        self.fetched - self.employees.len()
    }
}

/// Result of importing an uploaded CSV.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub source: String,
    pub rows: usize,
    pub upserted: usize,
    pub skipped: usize,
    pub mapping: FieldMapping,
}

/// Load, map and normalize one source without persisting anything.
///
/// An empty source yields an empty batch and never calls the model.
pub async fn prepare_source(loader: &dyn SourceLoader, mapper: &FieldMapper) -> Result<SourceBatch> {
    let records = loader.load().await?;
    let fields = sample_fields(&records);
    prepare_records(loader.name(), &records, &fields, mapper).await
}

async fn prepare_records(
    source: &str,
    records: &[RawRecord],
    fields: &[String],
    mapper: &FieldMapper,
) -> Result<SourceBatch> {
    if records.is_empty() {
        return Ok(SourceBatch {
            source: source.to_string(),
            fetched: 0,
            mapping: FieldMapping::new(),
            employees: Vec::new(),
        });
    }

    let mapping = mapper.infer_mapping(source, fields).await?;
    let employees = normalize_batch(source, records, &mapping);
    Ok(SourceBatch {
        source: source.to_string(),
        fetched: records.len(),
        mapping,
        employees,
    })
}

/// Normalize every given source without persisting.
pub async fn normalize_sources(
    loaders: &[Arc<dyn SourceLoader>],
    mapper: &FieldMapper,
) -> Result<Vec<SourceBatch>> {
    let mut batches = Vec::with_capacity(loaders.len());
    for loader in loaders {
        batches.push(prepare_source(loader.as_ref(), mapper).await?);
    }
    Ok(batches)
}

/// Normalize every given source and upsert all employees in one transaction.
pub async fn sync_sources(
    pool: &SqlitePool,
    loaders: &[Arc<dyn SourceLoader>],
    mapper: &FieldMapper,
) -> Result<Vec<SourceBatch>> {
    let batches = normalize_sources(loaders, mapper).await?;
    let employees: Vec<UnifiedEmployee> = batches
        .iter()
        .flat_map(|b| b.employees.iter().cloned())
        .collect();

    let written = store::upsert_employees(pool, &employees).await?;
    info!(sources = batches.len(), written, "sync complete");
    Ok(batches)
}

/// Map an uploaded CSV by its header row and upsert every valid row.
pub async fn import_csv(
    pool: &SqlitePool,
    loader: &CsvLoader,
    mapper: &FieldMapper,
) -> Result<ImportReport> {
    let records = loader.load().await?;
    let batch = prepare_records(loader.name(), &records, loader.headers(), mapper).await?;
    let upserted = store::upsert_employees(pool, &batch.employees).await?;

    info!(
        source = loader.name(),
        rows = batch.fetched,
        upserted,
        skipped = batch.skipped(),
        "CSV import complete"
    );

    Ok(ImportReport {
        source: batch.source.clone(),
        rows: batch.fetched,
        upserted,
        skipped: batch.skipped(),
        mapping: batch.mapping,
    })
}

/// Build a [`FieldMapper`] from `[llm]` and `[mapping]`.
pub fn mapper_from_config(config: &Config) -> Result<FieldMapper> {
    let model = create_model(&config.llm)?;
    FieldMapper::from_config(&config.mapping, model)
}

/// CLI entry point for `synchub sync <source|all>`.
pub async fn run_sync(config: &Config, target: &str) -> anyhow::Result<()> {
    let registry = LoaderRegistry::from_config(config);
    let loaders = if target == "all" {
        registry.all()
    } else {
        vec![registry
            .get(target)
            .ok_or_else(|| Error::NotFound(format!("source not registered: {}", target)))?]
    };

    let mapper = mapper_from_config(config)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let batches = sync_sources(&pool, &loaders, &mapper).await?;
    for batch in &batches {
        println!("sync {}", batch.source);
        println!("  fetched: {} records", batch.fetched);
        println!("  mapped fields: {}", batch.mapping.len());
        println!("  upserted: {}", batch.employees.len());
        println!("  skipped: {}", batch.skipped());
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// CLI entry point for `synchub import <file> --source <name>`.
pub async fn run_import(config: &Config, path: &Path, source: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)?;
    let loader = CsvLoader::from_csv(source, &bytes)?;

    let mapper = mapper_from_config(config)?;
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let report = import_csv(&pool, &loader, &mapper).await?;
    println!("import {}", report.source);
    println!("  rows: {}", report.rows);
    println!("  upserted: {}", report.upserted);
    println!("  skipped: {}", report.skipped);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// CLI entry point for `synchub mapping <source>`.
pub async fn run_mapping(config: &Config, source: &str) -> anyhow::Result<()> {
    let registry = LoaderRegistry::from_config(config);
    let loader = registry
        .get(source)
        .ok_or_else(|| Error::NotFound(format!("source not registered: {}", source)))?;

    let records = loader.load().await?;
    let fields = sample_fields(&records);
    if fields.is_empty() {
        anyhow::bail!("source has no records to map: {}", source);
    }

    let mapper = mapper_from_config(config)?;
    let mapping = mapper.infer_mapping(source, &fields).await?;
    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}
