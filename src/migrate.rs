use sqlx::SqlitePool;

use crate::error::Result;

/// Creates the `employees` and `query_logs` tables. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // employee_id is indexed but deliberately not UNIQUE; the upsert path
    // keeps it unique in practice.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id TEXT NOT NULL,
            name TEXT NOT NULL,
            salary REAL,
            email TEXT,
            department TEXT,
            location TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_employees_employee_id ON employees(employee_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_query_logs_created_at ON query_logs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
