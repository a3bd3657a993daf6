//! Natural-language question answering over the employees table.
//!
//! [`SqlQueryAgent`] runs a two-step text-to-SQL loop:
//!
//! 1. Ask the model for one read-only SQLite query, given the table DDL.
//! 2. Run it (capped at `agent.max_rows` rows) and ask the model to answer
//!    the question from the JSON result.
//!
//! Only a single `SELECT` or `WITH` statement is accepted, and it runs on a
//! connection in `query_only` mode so a `WITH ... DELETE` cannot write.

use async_trait::async_trait;
use serde_json::{Map, Value};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::llm::{create_model, ChatModel};
use crate::migrate;
use crate::query_log;

/// Answers free-text questions about persisted data.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}

pub struct SqlQueryAgent {
    model: Arc<dyn ChatModel>,
    pool: SqlitePool,
    max_rows: usize,
}

impl SqlQueryAgent {
    pub fn new(model: Arc<dyn ChatModel>, pool: SqlitePool, max_rows: usize) -> Self {
        Self {
            model,
            pool,
            max_rows,
        }
    }

    async fn table_ddl(&self) -> Result<String> {
        let ddl: Option<String> = sqlx::query_scalar(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'employees'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Agent(format!("failed to read schema: {}", e)))?;

        ddl.ok_or_else(|| Error::Agent("employees table does not exist".into()))
    }

    /// Run `sql` on a connection switched to `query_only`, reading at most
    /// `max_rows` rows. A statement that tries to write fails with
    /// [`Error::Agent`] and leaves the database untouched.
    async fn run_query(&self, sql: &str) -> Result<Vec<Value>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Agent(format!("no database connection: {}", e)))?;

        sqlx::query("PRAGMA query_only = ON")
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::Agent(format!("failed to enter read-only mode: {}", e)))?;

        let rows = fetch_capped(&mut *conn, sql, self.max_rows).await;

        if let Err(e) = sqlx::query("PRAGMA query_only = OFF")
            .execute(&mut *conn)
            .await
        {
            // Keep a connection stuck in read-only mode out of the pool.
            warn!(error = %e, "failed to leave read-only mode, dropping connection");
            drop(conn.detach());
        }

        rows
    }
}

async fn fetch_capped(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> Result<Vec<Value>> {
    let mut stream = sqlx::query(sql).fetch(conn);
    let mut rows = Vec::new();
    while rows.len() < max_rows {
        match stream
            .try_next()
            .await
            .map_err(|e| Error::Agent(format!("query failed: {}", e)))?
        {
            Some(row) => rows.push(row_to_json(&row)),
            None => break,
        }
    }
    Ok(rows)
}

#[async_trait]
impl QueryAgent for SqlQueryAgent {
    async fn ask(&self, question: &str) -> Result<String> {
        let ddl = self.table_ddl().await?;

        let reply = self
            .model
            .complete(&sql_prompt(&ddl, question))
            .await
            .map_err(agent_error)?;
        let sql = extract_sql(&reply);
        validate_sql(&sql)?;
        debug!(%sql, "agent query");

        let rows = self.run_query(&sql).await?;
        info!(rows = rows.len(), "agent query executed");

        let result = serde_json::to_string(&rows)
            .map_err(|e| Error::Agent(format!("failed to encode rows: {}", e)))?;
        let answer = self
            .model
            .complete(&answer_prompt(question, &sql, &result))
            .await
            .map_err(agent_error)?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(Error::Agent("model returned an empty answer".into()));
        }
        Ok(answer.to_string())
    }
}

/// CLI entry point for `synchub ask <question>`.
pub async fn run_ask(config: &Config, question: &str) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let agent = SqlQueryAgent::new(create_model(&config.llm)?, pool.clone(), config.agent.max_rows);
    let answer = agent.ask(question).await?;
    query_log::append(&pool, question, &answer).await?;
    println!("{}", answer);

    pool.close().await;
    Ok(())
}

fn agent_error(err: Error) -> Error {
    match err {
        Error::Timeout(_) | Error::Agent(_) => err,
        other => Error::Agent(other.to_string()),
    }
}

fn sql_prompt(ddl: &str, question: &str) -> String {
    format!(
        "You are a SQLite expert. Given the table below, write ONE read-only \
         SQLite query that answers the question.\n\n\
         {ddl}\n\n\
         Question: {question}\n\n\
         Reply with the SQL only, no explanation."
    )
}

fn answer_prompt(question: &str, sql: &str, result: &str) -> String {
    format!(
        "Question: {question}\n\
         SQL used: {sql}\n\
         Result rows (JSON): {result}\n\n\
         Answer the question in one or two plain sentences using only the result rows."
    )
}

/// Pull the SQL statement out of a model reply, stripping markdown fences
/// and a trailing semicolon.
pub fn extract_sql(reply: &str) -> String {
    let mut text = reply.trim();
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after
            .strip_prefix("sqlite")
            .or_else(|| after.strip_prefix("sql"))
            .unwrap_or(after);
        text = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
    }
    text.trim().trim_end_matches(';').trim().to_string()
}

/// Accept only a single `SELECT` or `WITH` statement.
pub fn validate_sql(sql: &str) -> Result<()> {
    if sql.is_empty() {
        return Err(Error::Agent("model returned no SQL".into()));
    }
    if sql.contains(';') {
        return Err(Error::Agent("multiple SQL statements are not allowed".into()));
    }

    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if first != "SELECT" && first != "WITH" {
        return Err(Error::Agent(format!(
            "only SELECT queries are allowed, got {}",
            first
        )));
    }
    Ok(())
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut obj = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        obj.insert(column.name().to_string(), cell_to_json(row, i));
    }
    Value::Object(obj)
}

fn cell_to_json(row: &SqliteRow, index: usize) -> Value {
    let kind = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    match kind.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
