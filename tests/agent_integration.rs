//! Integration tests for the text-to-SQL query agent.
//!
//! A queued model plays both turns of the loop against a temp database, and
//! records every prompt it was given.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use synchub::agent::{QueryAgent, SqlQueryAgent};
use synchub::config::Config;
use synchub::error::{Error, Result};
use synchub::llm::ChatModel;
use synchub::models::UnifiedEmployee;
use synchub::{db, migrate, store};
use tempfile::TempDir;

// ─── Test Model ─────────────────────────────────────────────────────

/// Pops one reply per call and keeps the prompts it received.
/// `None` in the queue stands for an unreachable provider.
struct QueuedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl QueuedModel {
    fn new(replies: &[Option<&str>]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for QueuedModel {
    fn model_name(&self) -> &str {
        "queued"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| Error::Upstream("connection refused".to_string()))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("synchub.sqlite");
    toml::from_str(&format!("[db]\npath = \"{}\"\n", db_path.display())).unwrap()
}

async fn seeded_pool(tmp: &TempDir, count: usize) -> SqlitePool {
    let pool = db::connect(&test_config(tmp)).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let employees: Vec<UnifiedEmployee> = (1..=count)
        .map(|i| UnifiedEmployee {
            employee_id: format!("E{}", i),
            name: format!("Employee {}", i),
            salary: Some(1000.0 * i as f64),
            email: None,
            department: Some("Engineering".to_string()),
            location: None,
        })
        .collect();
    store::upsert_employees(&pool, &employees).await.unwrap();
    pool
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ask_sends_ddl_then_answers_from_rows() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 3).await;
    let model = QueuedModel::new(&[
        Some("```sql\nSELECT COUNT(*) AS total FROM employees;\n```"),
        Some("  There are 3 employees.  "),
    ]);
    let agent = SqlQueryAgent::new(model.clone(), pool, 50);

    let answer = agent.ask("How many employees are there?").await.unwrap();
    assert_eq!(answer, "There are 3 employees.");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("CREATE TABLE"));
    assert!(prompts[0].contains("employees"));
    assert!(prompts[0].contains("How many employees are there?"));
    assert!(prompts[1].contains("SELECT COUNT(*) AS total FROM employees"));
    assert!(prompts[1].contains(r#"[{"total":3}]"#));
}

#[tokio::test]
async fn test_ask_caps_rows_at_max_rows() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 5).await;
    let model = QueuedModel::new(&[
        Some("SELECT employee_id FROM employees ORDER BY employee_id"),
        Some("E1 and E2."),
    ]);
    let agent = SqlQueryAgent::new(model.clone(), pool, 2);

    agent.ask("List the employee ids").await.unwrap();

    let prompts = model.prompts();
    assert!(prompts[1].contains(r#"[{"employee_id":"E1"},{"employee_id":"E2"}]"#));
    assert!(!prompts[1].contains("E3"));
}

#[tokio::test]
async fn test_failed_model_call_is_agent_error() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 1).await;
    let agent = SqlQueryAgent::new(QueuedModel::new(&[None]), pool, 50);

    let err = agent.ask("Who earns the most?").await.unwrap_err();
    assert!(matches!(err, Error::Agent(_)));
}

#[tokio::test]
async fn test_failed_answer_call_is_agent_error() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 1).await;
    let model = QueuedModel::new(&[Some("SELECT name FROM employees"), None]);
    let agent = SqlQueryAgent::new(model.clone(), pool, 50);

    let err = agent.ask("Who works here?").await.unwrap_err();
    assert!(matches!(err, Error::Agent(_)));
    assert_eq!(model.prompts().len(), 2);
}

#[tokio::test]
async fn test_with_prefixed_delete_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 2).await;
    let model = QueuedModel::new(&[
        Some("WITH t AS (SELECT 1) DELETE FROM employees"),
        Some("done"),
    ]);
    let agent = SqlQueryAgent::new(model.clone(), pool.clone(), 50);

    let err = agent.ask("Remove everyone").await.unwrap_err();
    assert!(matches!(err, Error::Agent(_)));
    assert_eq!(model.prompts().len(), 1);
    assert_eq!(store::list_employees(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rejected_write_leaves_pool_writable() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 1).await;
    let model = QueuedModel::new(&[
        Some("WITH t AS (SELECT 1) UPDATE employees SET name = 'x'"),
    ]);
    let agent = SqlQueryAgent::new(model, pool.clone(), 50);

    assert!(agent.ask("Rename everyone").await.is_err());

    // Later writes through the same pool still go through.
    store::upsert_employees(
        &pool,
        &[UnifiedEmployee {
            employee_id: "E9".to_string(),
            name: "Later".to_string(),
            salary: None,
            email: None,
            department: None,
            location: None,
        }],
    )
    .await
    .unwrap();
    let rows = store::list_employees(&pool).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.name != "x"));
}

#[tokio::test]
async fn test_plain_write_fails_validation_before_running() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp, 1).await;
    let model = QueuedModel::new(&[Some("DROP TABLE employees")]);
    let agent = SqlQueryAgent::new(model, pool.clone(), 50);

    let err = agent.ask("Drop it").await.unwrap_err();
    assert!(matches!(err, Error::Agent(_)));
    assert_eq!(store::list_employees(&pool).await.unwrap().len(), 1);
}
