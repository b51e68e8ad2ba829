//! Upvote set: at most one row per (user, report)

use infrafix_common::Result;
use sqlx::{SqliteConnection, SqliteExecutor};

/// Flip the caller's upvote; returns whether the report is now upvoted
///
/// The insert is attempted first so two concurrent toggles for the same pair
/// cannot both observe "absent" and insert twice.
pub async fn toggle_upvote(conn: &mut SqliteConnection, user_id: i64, report_id: i64) -> Result<bool> {
    let inserted = sqlx::query(
        "INSERT INTO upvotes (user_id, report_id) VALUES (?, ?) ON CONFLICT(user_id, report_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(report_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted > 0 {
        return Ok(true);
    }

    sqlx::query("DELETE FROM upvotes WHERE user_id = ? AND report_id = ?")
        .bind(user_id)
        .bind(report_id)
        .execute(&mut *conn)
        .await?;
    Ok(false)
}

/// User ids that upvoted a report, in vote order
pub async fn voters_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<Vec<i64>> {
    let voters: Vec<i64> = sqlx::query_scalar("SELECT user_id FROM upvotes WHERE report_id = ? ORDER BY id")
        .bind(report_id)
        .fetch_all(executor)
        .await?;
    Ok(voters)
}

pub async fn delete_upvotes_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM upvotes WHERE report_id = ?")
        .bind(report_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
