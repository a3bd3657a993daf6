//! Append-only log of answered natural-language questions.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::migrate;
use crate::models::QueryLogEntry;

/// Record a question/answer pair with a server-assigned timestamp.
pub async fn append(pool: &SqlitePool, question: &str, answer: &str) -> Result<i64> {
    let now = Utc::now().timestamp_millis();
    let result =
        sqlx::query("INSERT INTO query_logs (question, answer, created_at) VALUES (?, ?, ?)")
            .bind(question)
            .bind(answer)
            .bind(now)
            .execute(pool)
            .await?;
    Ok(result.last_insert_rowid())
}

/// The most recent `limit` entries, newest first.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<QueryLogEntry>> {
    let rows = sqlx::query(
        "SELECT id, question, answer, created_at FROM query_logs ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| QueryLogEntry {
            id: row.get("id"),
            question: row.get("question"),
            answer: row.get("answer"),
            timestamp: format_ts_iso(row.get("created_at")),
        })
        .collect())
}

/// CLI entry point for `synchub logs`. Defaults to `logs.page_size` entries.
pub async fn run_logs(config: &Config, limit: Option<i64>) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let limit = limit.unwrap_or(config.logs.page_size).max(1);
    let entries = recent(&pool, limit).await?;
    if entries.is_empty() {
        println!("No questions logged yet.");
    }
    for entry in &entries {
        println!("[{}] Q: {}", entry.timestamp, entry.question);
        println!("    A: {}", entry.answer);
    }

    pool.close().await;
    Ok(())
}

fn format_ts_iso(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
