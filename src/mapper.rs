//! LLM-driven field mapping.
//!
//! Given a source name and the field names it exposes, the [`FieldMapper`]
//! asks a [`ChatModel`] to translate them into the unified schema and parses
//! the first balanced JSON object out of the reply.
//!
//! # Policy
//!
//! - Targets outside the six unified field names, and non-string values, are
//!   dropped with a warning.
//! - Successful inferences are cached per `(source, sorted field set)` when
//!   `[mapping] cache = true`.
//! - When inference fails and a static fallback exists for the source, the
//!   fallback is returned instead; otherwise the error propagates.
//!   Fallback results are never cached.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::models::{FieldMapping, UnifiedField};

type CacheKey = (String, Vec<String>);

pub struct FieldMapper {
    model: Arc<dyn ChatModel>,
    cache: Option<Mutex<HashMap<CacheKey, FieldMapping>>>,
    fallbacks: HashMap<String, FieldMapping>,
}

impl FieldMapper {
    /// A mapper with no cache and no fallbacks: every call hits the model.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            cache: None,
            fallbacks: HashMap::new(),
        }
    }

    /// A mapper configured from `[mapping]`: built-in fallbacks for the mock
    /// sources, overridden per source by `[mapping.fallback.<source>]`.
    pub fn from_config(config: &MappingConfig, model: Arc<dyn ChatModel>) -> Result<Self> {
        let mut mapper = Self::new(model);
        if config.cache {
            mapper = mapper.with_cache();
        }
        for (source, mapping) in builtin_fallbacks() {
            mapper.fallbacks.insert(source, mapping);
        }
        for (source, fields) in &config.fallback {
            mapper
                .fallbacks
                .insert(source.clone(), mapping_from_table(fields)?);
        }
        Ok(mapper)
    }

    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn with_fallback(mut self, source: impl Into<String>, mapping: FieldMapping) -> Self {
        self.fallbacks.insert(source.into(), mapping);
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Number of cached mappings (0 when caching is off).
    pub fn cached_len(&self) -> usize {
        self.cache
            .as_ref()
            .and_then(|c| c.lock().ok().map(|m| m.len()))
            .unwrap_or(0)
    }

    /// Infer a mapping from `field_names` to the unified schema.
    pub async fn infer_mapping(
        &self,
        source_name: &str,
        field_names: &[String],
    ) -> Result<FieldMapping> {
        let key = cache_key(source_name, field_names);
        if let Some(hit) = self.cached(&key) {
            debug!(source = source_name, "mapping cache hit");
            return Ok(hit);
        }

        match self.infer_with_model(source_name, field_names).await {
            Ok(mapping) => {
                info!(
                    source = source_name,
                    fields = field_names.len(),
                    mapped = mapping.len(),
                    "inferred field mapping"
                );
                self.store(key, &mapping);
                Ok(mapping)
            }
            Err(e) => match self.fallbacks.get(source_name) {
                Some(fallback) => {
                    warn!(
                        source = source_name,
                        error = %e,
                        "mapping inference failed, using static fallback"
                    );
                    Ok(fallback.clone())
                }
                None => Err(e),
            },
        }
    }

    async fn infer_with_model(
        &self,
        source_name: &str,
        field_names: &[String],
    ) -> Result<FieldMapping> {
        let prompt = build_prompt(source_name, field_names);
        debug!(source = source_name, %prompt, "mapping prompt");

        let raw = self.model.complete(&prompt).await?;
        debug!(source = source_name, raw = %raw.trim(), "mapping response");
        parse_mapping(source_name, &raw)
    }

    fn cached(&self, key: &CacheKey) -> Option<FieldMapping> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().ok()?;
        guard.get(key).cloned()
    }

    fn store(&self, key: CacheKey, mapping: &FieldMapping) {
        if let Some(cache) = &self.cache {
            if let Ok(mut guard) = cache.lock() {
                guard.insert(key, mapping.clone());
            }
        }
    }
}

fn cache_key(source_name: &str, field_names: &[String]) -> CacheKey {
    let mut fields = field_names.to_vec();
    fields.sort();
    fields.dedup();
    (source_name.to_string(), fields)
}

/// Build the instruction sent to the model.
pub fn build_prompt(source_name: &str, field_names: &[String]) -> String {
    let targets: Vec<&str> = UnifiedField::ALL.iter().map(|f| f.as_str()).collect();
    let fields = serde_json::to_string(field_names).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"Given a list of keys from a data source called "{source}", map them to a standard unified schema for employee data.

The standard fields are: {targets}.

Here are the fields: {fields}

Respond with a JSON dictionary where each source field maps to a unified field.
Only map what's available. Don't guess extra fields. Don't output any extra text, just output the JSON dictionary.

Example:
{{ "emp_id": "employee_id", "emp_name": "name" }}

Now give only the JSON mapping.
"#,
        source = source_name,
        targets = targets.join(", "),
        fields = fields,
    )
}

/// Parse a model reply into a [`FieldMapping`].
///
/// Fails with [`Error::Mapping`] when the reply holds no balanced `{...}`
/// span or the span is not a JSON object.
pub fn parse_mapping(source_name: &str, raw: &str) -> Result<FieldMapping> {
    let span = extract_json_object(raw)
        .ok_or_else(|| Error::Mapping("response contained no JSON object".to_string()))?;

    let value: Value = serde_json::from_str(span)
        .map_err(|e| Error::Mapping(format!("could not parse JSON object: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::Mapping("JSON span is not an object".to_string()))?;

    let mut mapping = FieldMapping::new();
    for (source_field, target) in object {
        let Some(target) = target.as_str() else {
            warn!(
                source = source_name,
                field = %source_field,
                "dropping mapping entry with non-string target"
            );
            continue;
        };
        match UnifiedField::from_str(target) {
            Ok(field) => mapping.insert(source_field.clone(), field),
            Err(_) => warn!(
                source = source_name,
                field = %source_field,
                proposed = target,
                "dropping mapping entry outside the unified schema"
            ),
        }
    }
    Ok(mapping)
}

/// Return the first balanced brace-delimited span in `text`.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count toward balance.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn mapping_from_table(fields: &BTreeMap<String, String>) -> Result<FieldMapping> {
    fields
        .iter()
        .map(|(source, target)| Ok((source.clone(), UnifiedField::from_str(target)?)))
        .collect()
}

/// Static mappings for the built-in mock sources.
pub fn builtin_fallbacks() -> Vec<(String, FieldMapping)> {
    use UnifiedField::*;
    vec![
        (
            "FakeSAP".to_string(),
            [
                ("emp_id", EmployeeId),
                ("emp_name", Name),
                ("emp_sal", Salary),
                ("emp_email_id", Email),
                ("emp_dept", Department),
                ("emp_work_location", Location),
            ]
            .into_iter()
            .collect(),
        ),
        (
            "FakeWorkday".to_string(),
            [
                ("id", EmployeeId),
                ("name", Name),
                ("sal", Salary),
                ("email_id", Email),
                ("dept", Department),
                ("work_location", Location),
            ]
            .into_iter()
            .collect(),
        ),
    ]
}
