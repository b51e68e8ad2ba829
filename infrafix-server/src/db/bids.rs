//! Contractor bids

use infrafix_common::db::{Bid, BidEvaluation, UserSummary};
use infrafix_common::time::{now, to_db_timestamp};
use infrafix_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{enum_column, timestamp_column};

const BID_COLUMNS: &str = r#"
    SELECT b.id, b.amount, b.description, b.contractor_id, b.report_id,
           b.ai_evaluation, b.created_at, u.name AS contractor_name
    FROM bids b JOIN users u ON u.id = b.contractor_id
"#;

fn bid_from_row(row: &SqliteRow) -> Result<Bid> {
    let contractor_id: i64 = row.try_get("contractor_id")?;
    Ok(Bid {
        id: row.try_get("id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        contractor_id,
        report_id: row.try_get("report_id")?,
        ai_evaluation: enum_column(row, "ai_evaluation")?,
        created_at: timestamp_column(row, "created_at")?,
        contractor: UserSummary {
            id: contractor_id,
            name: row.try_get("contractor_name")?,
        },
    })
}

pub async fn insert_bid<'e>(
    executor: impl SqliteExecutor<'e>,
    report_id: i64,
    contractor_id: i64,
    amount: f64,
    description: &str,
    evaluation: BidEvaluation,
) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO bids (amount, description, contractor_id, report_id, ai_evaluation, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(amount)
    .bind(description)
    .bind(contractor_id)
    .bind(report_id)
    .bind(evaluation.as_str())
    .bind(to_db_timestamp(&now()))
    .execute(executor)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find_bid<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<Option<Bid>> {
    let row = sqlx::query(&format!("{} WHERE b.id = ?", BID_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(bid_from_row).transpose()
}

/// Bids on a report, cheapest first
pub async fn bids_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<Vec<Bid>> {
    let rows = sqlx::query(&format!(
        "{} WHERE b.report_id = ? ORDER BY b.amount ASC, b.id ASC",
        BID_COLUMNS
    ))
    .bind(report_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(bid_from_row).collect()
}

pub async fn delete_bid<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM bids WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_bids_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM bids WHERE report_id = ?")
        .bind(report_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
