//! Employee persistence: upsert keyed by `employee_id`.
//!
//! A batch runs in a single transaction that commits once at the end. Any
//! failure drops the transaction, rolling back every row of the batch.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::Result;
use crate::models::{EmployeeRow, UnifiedEmployee};

/// Upsert every record; returns the number of records written.
///
/// An existing row with the same `employee_id` has all of its mapped
/// fields overwritten (full replace, absent values become NULL).
pub async fn upsert_employees(pool: &SqlitePool, employees: &[UnifiedEmployee]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    let mut updated = 0usize;

    for employee in employees {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM employees WHERE employee_id = ? ORDER BY id LIMIT 1")
                .bind(&employee.employee_id)
                .fetch_optional(&mut *tx)
                .await?;

        match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE employees
                    SET name = ?, salary = ?, email = ?, department = ?, location = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&employee.name)
                .bind(employee.salary)
                .bind(&employee.email)
                .bind(&employee.department)
                .bind(&employee.location)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                updated += 1;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO employees (employee_id, name, salary, email, department, location)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&employee.employee_id)
                .bind(&employee.name)
                .bind(employee.salary)
                .bind(&employee.email)
                .bind(&employee.department)
                .bind(&employee.location)
                .execute(&mut *tx)
                .await?;
                inserted += 1;
            }
        }
    }

    tx.commit().await?;
    info!(inserted, updated, "employee batch committed");
    Ok(inserted + updated)
}

/// Every persisted row, ordered by surrogate id.
pub async fn list_employees(pool: &SqlitePool) -> Result<Vec<EmployeeRow>> {
    let rows = sqlx::query(
        "SELECT id, employee_id, name, salary, email, department, location FROM employees ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(employee_from_row).collect())
}

/// The row for one `employee_id`, if persisted.
pub async fn find_employee(pool: &SqlitePool, employee_id: &str) -> Result<Option<EmployeeRow>> {
    let row = sqlx::query(
        "SELECT id, employee_id, name, salary, email, department, location FROM employees WHERE employee_id = ? ORDER BY id LIMIT 1",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(employee_from_row))
}

fn employee_from_row(row: &SqliteRow) -> EmployeeRow {
    EmployeeRow {
        id: row.get("id"),
        employee_id: row.get("employee_id"),
        name: row.get("name"),
        salary: row.get("salary"),
        email: row.get("email"),
        department: row.get("department"),
        location: row.get("location"),
    }
}
