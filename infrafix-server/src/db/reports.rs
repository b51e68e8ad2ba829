//! Report rows and the assembled report views

use infrafix_common::db::{Comment, Image, Report, ReportStatus, UserSummary};
use infrafix_common::time::to_db_timestamp;
use infrafix_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};

use super::{comments, enum_column, images, timestamp_column, upvotes};

const REPORT_SELECT: &str = r#"
    SELECT r.id, r.title, r.description, r.category, r.latitude, r.longitude,
           r.address, r.status, r.severity, r.urgency, r.processed_image,
           r.user_id, r.created_at, u.name AS user_name,
           (SELECT COUNT(*) FROM upvotes v WHERE v.report_id = r.id) AS upvote_count
    FROM reports r JOIN users u ON u.id = r.user_id
"#;

/// Columns written when a report is created
#[derive(Debug, Clone)]
pub struct NewReportRow<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<&'a str>,
    pub severity: &'a str,
    pub urgency: &'a str,
    pub processed_image: Option<&'a str>,
    pub user_id: i64,
}

/// Report with owner, images, comments and vote count
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    pub user: UserSummary,
    pub images: Vec<Image>,
    pub comments: Vec<Comment>,
    pub upvote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub user_id: i64,
}

/// Single-report view including voters and the requesting user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    #[serde(flatten)]
    pub view: ReportView,
    pub upvotes: Vec<Voter>,
    pub current_user_id: i64,
}

/// Optional listing filters; empty strings are treated as absent
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub category: Option<String>,
    pub q: Option<String>,
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    Ok(Report {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        address: row.try_get("address")?,
        status: enum_column(row, "status")?,
        severity: row.try_get("severity")?,
        urgency: row.try_get("urgency")?,
        processed_image: row.try_get("processed_image")?,
        user_id: row.try_get("user_id")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<(Report, UserSummary, i64)> {
    let report = report_from_row(row)?;
    let user = UserSummary {
        id: report.user_id,
        name: row.try_get("user_name")?,
    };
    Ok((report, user, row.try_get("upvote_count")?))
}

pub async fn insert_report<'e>(executor: impl SqliteExecutor<'e>, new: &NewReportRow<'_>) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO reports (
            title, description, category, latitude, longitude, address,
            status, severity, urgency, processed_image, user_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(new.title)
    .bind(new.description)
    .bind(new.category)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.address)
    .bind(ReportStatus::Open.as_str())
    .bind(new.severity)
    .bind(new.urgency)
    .bind(new.processed_image)
    .bind(new.user_id)
    .bind(to_db_timestamp(&infrafix_common::time::now()))
    .execute(executor)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find_report<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<Option<Report>> {
    let row = sqlx::query("SELECT * FROM reports WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(report_from_row).transpose()
}

/// Overwrite the user-editable columns
pub async fn update_report_fields<'e>(executor: impl SqliteExecutor<'e>, report: &Report) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE reports
        SET title = ?, description = ?, category = ?, latitude = ?, longitude = ?,
            address = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(&report.title)
    .bind(&report.description)
    .bind(&report.category)
    .bind(report.latitude)
    .bind(report.longitude)
    .bind(&report.address)
    .bind(report.status.as_str())
    .bind(report.id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Returns false when the report does not exist
pub async fn set_status<'e>(executor: impl SqliteExecutor<'e>, id: i64, status: ReportStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE reports SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_report_row<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reports WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
pub fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

async fn assemble_view(
    pool: &SqlitePool,
    report: Report,
    user: UserSummary,
    upvote_count: i64,
) -> Result<ReportView> {
    let images = images::images_for_report(pool, report.id).await?;
    let comments = comments::comments_for_report(pool, report.id).await?;
    Ok(ReportView {
        report,
        user,
        images,
        comments,
        upvote_count,
    })
}

/// Filtered listing ordered by votes, then recency
pub async fn list_reports(pool: &SqlitePool, filter: &ReportFilter) -> Result<Vec<ReportView>> {
    let category = filter.category.as_deref().filter(|c| !c.is_empty());
    let pattern = filter
        .q
        .as_deref()
        .filter(|q| !q.is_empty())
        .map(like_pattern);

    let sql = format!(
        r#"{}
        WHERE (?1 IS NULL OR r.status = ?1)
          AND (?2 IS NULL OR r.category = ?2)
          AND (?3 IS NULL
               OR r.title LIKE ?3 ESCAPE '\'
               OR r.description LIKE ?3 ESCAPE '\'
               OR r.address LIKE ?3 ESCAPE '\'
               OR r.category LIKE ?3 ESCAPE '\')
        ORDER BY upvote_count DESC, r.created_at DESC, r.id DESC
        "#,
        REPORT_SELECT
    );

    let rows = sqlx::query(&sql)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(category)
        .bind(pattern)
        .fetch_all(pool)
        .await?;

    let mut views = Vec::with_capacity(rows.len());
    for row in &rows {
        let (report, user, upvote_count) = summary_from_row(row)?;
        views.push(assemble_view(pool, report, user, upvote_count).await?);
    }
    Ok(views)
}

pub async fn load_view(pool: &SqlitePool, id: i64) -> Result<Option<ReportView>> {
    let row = sqlx::query(&format!("{} WHERE r.id = ?", REPORT_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let (report, user, upvote_count) = summary_from_row(&row)?;
            Ok(Some(assemble_view(pool, report, user, upvote_count).await?))
        }
        None => Ok(None),
    }
}

pub async fn load_detail(pool: &SqlitePool, id: i64, current_user_id: i64) -> Result<Option<ReportDetail>> {
    let Some(view) = load_view(pool, id).await? else {
        return Ok(None);
    };
    let upvotes = upvotes::voters_for_report(pool, id)
        .await?
        .into_iter()
        .map(|user_id| Voter { user_id })
        .collect();

    Ok(Some(ReportDetail {
        view,
        upvotes,
        current_user_id,
    }))
}
