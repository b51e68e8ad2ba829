//! User accounts

use infrafix_common::db::{Role, User};
use infrafix_common::time::{now, to_db_timestamp};
use infrafix_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{enum_column, timestamp_column};

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: enum_column(row, "role")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

/// Insert a user; a duplicate email surfaces as a unique-constraint database error
pub async fn insert_user<'e>(
    executor: impl SqliteExecutor<'e>,
    name: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<User> {
    let created_at = now();
    let id = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(to_db_timestamp(&created_at))
    .execute(executor)
    .await?
    .last_insert_rowid();

    Ok(User {
        id,
        name: name.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        role,
        created_at,
    })
}

pub async fn find_user_by_email<'e>(
    executor: impl SqliteExecutor<'e>,
    email: &str,
) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn email_exists<'e>(executor: impl SqliteExecutor<'e>, email: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// True when the error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
