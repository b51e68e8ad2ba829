//! Report comments

use infrafix_common::db::{Comment, UserSummary};
use infrafix_common::time::{now, to_db_timestamp};
use infrafix_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::timestamp_column;

fn comment_from_row(row: &SqliteRow) -> Result<Comment> {
    let user_id: i64 = row.try_get("user_id")?;
    Ok(Comment {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        report_id: row.try_get("report_id")?,
        user_id,
        created_at: timestamp_column(row, "created_at")?,
        user: UserSummary {
            id: user_id,
            name: row.try_get("user_name")?,
        },
    })
}

pub async fn insert_comment<'e>(
    executor: impl SqliteExecutor<'e>,
    report_id: i64,
    user_id: i64,
    text: &str,
) -> Result<i64> {
    let id = sqlx::query("INSERT INTO comments (text, report_id, user_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(text)
        .bind(report_id)
        .bind(user_id)
        .bind(to_db_timestamp(&now()))
        .execute(executor)
        .await?
        .last_insert_rowid();
    Ok(id)
}

pub async fn find_comment<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(
        r#"
        SELECT c.id, c.text, c.report_id, c.user_id, c.created_at, u.name AS user_name
        FROM comments c JOIN users u ON u.id = c.user_id
        WHERE c.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(comment_from_row).transpose()
}

/// Comments on a report, newest first
pub async fn comments_for_report<'e>(
    executor: impl SqliteExecutor<'e>,
    report_id: i64,
) -> Result<Vec<Comment>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.text, c.report_id, c.user_id, c.created_at, u.name AS user_name
        FROM comments c JOIN users u ON u.id = c.user_id
        WHERE c.report_id = ?
        ORDER BY c.created_at DESC, c.id DESC
        "#,
    )
    .bind(report_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(comment_from_row).collect()
}

pub async fn delete_comments_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM comments WHERE report_id = ?")
        .bind(report_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
