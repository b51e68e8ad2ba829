//! Image references attached to reports

use infrafix_common::db::Image;
use infrafix_common::Result;
use sqlx::{Row, SqliteConnection, SqliteExecutor};

/// Insert image rows in submission order
pub async fn insert_images(conn: &mut SqliteConnection, report_id: i64, urls: &[String]) -> Result<()> {
    for url in urls {
        sqlx::query("INSERT INTO images (url, report_id) VALUES (?, ?)")
            .bind(url)
            .bind(report_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn delete_images_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM images WHERE report_id = ?")
        .bind(report_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn images_for_report<'e>(executor: impl SqliteExecutor<'e>, report_id: i64) -> Result<Vec<Image>> {
    let rows = sqlx::query("SELECT id, url, report_id FROM images WHERE report_id = ? ORDER BY id")
        .bind(report_id)
        .fetch_all(executor)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(Image {
                id: row.try_get("id")?,
                url: row.try_get("url")?,
                report_id: row.try_get("report_id")?,
            })
        })
        .collect()
}
