//! HTTP API tests.
//!
//! Each test builds the router over a temp database and drives it with
//! `tower::ServiceExt::oneshot`, without binding a socket.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use synchub::agent::QueryAgent;
use synchub::config::Config;
use synchub::error::{Error, Result};
use synchub::llm::ChatModel;
use synchub::loaders::LoaderRegistry;
use synchub::mapper::FieldMapper;
use synchub::models::{FieldMapping, UnifiedField};
use synchub::server::{build_router, AppState};
use synchub::{db, migrate, store};
use tempfile::TempDir;
use tower::util::ServiceExt;

// ─── Test doubles ───────────────────────────────────────────────────

/// A model that is never reachable; mappings come from fallbacks.
struct OfflineModel;

#[async_trait]
impl ChatModel for OfflineModel {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Upstream("offline".to_string()))
    }
}

/// A reachable model that answers in prose instead of a JSON mapping.
struct ProseModel;

#[async_trait]
impl ChatModel for ProseModel {
    fn model_name(&self) -> &str {
        "prose"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok("Sorry, I am not sure how these columns line up.".to_string())
    }
}

struct FixedAgent(Option<&'static str>);

#[async_trait]
impl QueryAgent for FixedAgent {
    async fn ask(&self, _question: &str) -> Result<String> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| Error::Agent("agent exploded".to_string()))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

const BOUNDARY: &str = "synchub-test-boundary";

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("synchub.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[logs]
page_size = 20
"#,
        db_path.display()
    );
    toml::from_str(&config_content).unwrap()
}

async fn test_state(tmp: &TempDir, answer: Option<&'static str>) -> AppState {
    let cfg = test_config(tmp);
    let upload_mapping: FieldMapping = [
        ("id", UnifiedField::EmployeeId),
        ("name", UnifiedField::Name),
        ("sal", UnifiedField::Salary),
    ]
    .into_iter()
    .collect();
    let mapper = FieldMapper::from_config(&cfg.mapping, Arc::new(OfflineModel))
        .unwrap()
        .with_fallback("Upload", upload_mapping);

    state_with(cfg, mapper, Arc::new(FixedAgent(answer))).await
}

async fn state_with(cfg: Config, mapper: FieldMapper, agent: Arc<dyn QueryAgent>) -> AppState {
    let pool = db::connect(&cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    AppState::new(cfg, pool, LoaderRegistry::with_builtins(), mapper, agent)
}

fn app(state: &AppState) -> Router {
    build_router(state.clone())
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(source_name: &str, content_type: &str, csv: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"source_name\"\r\n\r\n\
         {source_name}\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"staff.csv\"\r\n\
         Content-Type: {content_type}\r\n\r\n\
         {csv}\r\n\
         --{b}--\r\n",
        b = BOUNDARY
    );
    Request::builder()
        .method("POST")
        .uri("/upload-csv")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_and_health() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(&state, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "SyncHub API is alive!");

    let (status, body) = send(&state, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_connect_unknown_source_is_404() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(
        &state,
        json_request("POST", "/connect-source", json!({ "name": "Nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_connect_is_idempotent_and_listed() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let req = || json_request("POST", "/connect-source", json!({ "name": "FakeSAP" }));
    let (status, _) = send(&state, req()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&state, req()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("already connected"));

    let (_, body) = send(&state, get("/list-connected-sources")).await;
    let list = body["connected_sources"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "FakeSAP");
}

#[tokio::test]
async fn test_disconnect_unconnected_is_404() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, _) = send(
        &state,
        json_request("DELETE", "/disconnect-source", json!({ "name": "FakeSAP" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_data_syncs_connected_sources() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    send(
        &state,
        json_request("POST", "/connect-source", json!({ "name": "FakeSAP" })),
    )
    .await;

    let (status, body) = send(&state, get("/get-data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["connected_sources"], json!(["FakeSAP"]));

    let (_, body) = send(&state, get("/employees")).await;
    assert_eq!(body["employees"].as_array().unwrap().len(), 2);

    let (_, body) = send(&state, get("/stats")).await;
    assert_eq!(body["total_employees"], 2);
    assert_eq!(body["by_department"]["Unknown"], 2);
    assert_eq!(body["by_source"]["FakeSAP"], 2);
}

#[tokio::test]
async fn test_normalised_data_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(&state, get("/normalised-data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert!(store::list_employees(&state.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_field_mapping_and_schema() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, _) = send(&state, get("/field-mapping/Nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&state, get("/field-mapping/FakeWorkday")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mapping"]["sal"], "salary");

    let (status, body) = send(&state, get("/source-schema/FakeSAP")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample"]["emp_name"], "Ramesh");
    assert_eq!(body["fields"].as_array().unwrap().len(), 3);

    let (status, _) = send(&state, get("/source-schema/Nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_csv_imports_rows() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(
        &state,
        upload("Upload", "text/csv", "id,name,sal\n7,Asha,9000\n"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows_processed"], 1);

    let row = store::find_employee(&state.pool, "7").await.unwrap().unwrap();
    assert_eq!(row.name, "Asha");
    assert_eq!(row.salary, Some(9000.0));
    assert!(state.loaders.read().await.contains("Upload"));
}

#[tokio::test]
async fn test_unparseable_mapping_is_500_and_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    let state = state_with(
        test_config(&tmp),
        FieldMapper::new(Arc::new(ProseModel)),
        Arc::new(FixedAgent(Some("ok"))),
    )
    .await;

    let (status, body) = send(
        &state,
        upload("Acme", "text/csv", "staff_no,full_name\n9,Kiran\n"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "mapping_failed");
    assert!(store::list_employees(&state.pool).await.unwrap().is_empty());

    // The loader stays registered, and asking for its mapping fails the same way.
    let (status, body) = send(&state, get("/field-mapping/Acme")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "mapping_failed");
    assert!(store::list_employees(&state.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_empty_csv_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(&state, upload("Upload", "text/csv", "")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!state.loaders.read().await.contains("Upload"));
    assert!(store::list_employees(&state.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_non_csv_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, _) = send(
        &state,
        upload("Upload", "application/json", "id,name\n1,A\n"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!state.loaders.read().await.contains("Upload"));
}

#[tokio::test]
async fn test_ask_logs_only_successful_answers() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("There are 2 employees.")).await;

    let (status, _) = send(&state, json_request("POST", "/ask", json!({ "question": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &state,
        json_request("POST", "/ask", json!({ "question": "How many employees?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "There are 2 employees.");

    let (_, body) = send(&state, get("/logs")).await;
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["question"], "How many employees?");
}

#[tokio::test]
async fn test_ask_failure_is_not_logged() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, None).await;

    let (status, body) = send(
        &state,
        json_request("POST", "/ask", json!({ "question": "Who earns most?" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "agent_error");

    let (_, body) = send(&state, get("/logs")).await;
    assert!(body["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_source() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    send(
        &state,
        json_request("POST", "/connect-source", json!({ "name": "FakeSAP" })),
    )
    .await;

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/sources/FakeSAP")
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&state, delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!state.connected.read().await.is_connected("FakeSAP"));

    let (status, _) = send(&state, delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_unconnected_source() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp, Some("ok")).await;

    let (status, body) = send(
        &state,
        Request::builder()
            .method("DELETE")
            .uri("/sources/FakeWorkday")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Removed source FakeWorkday");
    assert!(!state.loaders.read().await.contains("FakeWorkday"));
    assert!(state.connected.read().await.list().is_empty());
}
