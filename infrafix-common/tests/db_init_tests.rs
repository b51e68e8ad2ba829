//! Database initialization tests
//!
//! Covers schema creation, idempotent reopen, foreign key enforcement on
//! every pooled connection, and the upvote pair constraint.

use infrafix_common::api::auth::load_shared_secret;
use infrafix_common::db::init::init_database;

async fn insert_user(pool: &sqlx::SqlitePool, email: &str) -> i64 {
    sqlx::query(
        "INSERT INTO users (name, email, password_hash, role, created_at)
         VALUES ('Test', ?, 'h', 'CITIZEN', '2024-01-01T00:00:00.000000Z')",
    )
    .bind(email)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn insert_report(pool: &sqlx::SqlitePool, user_id: i64) -> i64 {
    sqlx::query(
        "INSERT INTO reports (title, description, category, severity, urgency, user_id, created_at)
         VALUES ('t', 'd', 'Road', 'Medium', 'Within a week', ?, '2024-01-01T00:00:00.000000Z')",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("infrafix.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("infrafix.db");

    let pool1 = init_database(&db_path).await.unwrap();
    insert_user(&pool1, "first@example.com").await;
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "Reopening must not drop existing rows");
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("infrafix.db")).await.unwrap();

    for table in ["settings", "users", "reports", "images", "comments", "upvotes", "bids"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "Table {} missing", table);
    }
}

#[tokio::test]
async fn test_report_delete_blocked_by_owned_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("infrafix.db")).await.unwrap();

    let user_id = insert_user(&pool, "owner@example.com").await;
    let report_id = insert_report(&pool, user_id).await;
    sqlx::query("INSERT INTO images (url, report_id) VALUES ('/uploads/a.jpg', ?)")
        .bind(report_id)
        .execute(&pool)
        .await
        .unwrap();

    // No cascade: the image still references the report
    let result = sqlx::query("DELETE FROM reports WHERE id = ?")
        .bind(report_id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "Foreign key should block deleting a referenced report");
}

#[tokio::test]
async fn test_upvote_pair_is_unique() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("infrafix.db")).await.unwrap();

    let user_id = insert_user(&pool, "voter@example.com").await;
    let report_id = insert_report(&pool, user_id).await;

    let insert = "INSERT INTO upvotes (user_id, report_id) VALUES (?, ?)";
    sqlx::query(insert).bind(user_id).bind(report_id).execute(&pool).await.unwrap();
    let second = sqlx::query(insert).bind(user_id).bind(report_id).execute(&pool).await;
    assert!(second.is_err(), "Duplicate (user, report) pair must be rejected");
}

#[tokio::test]
async fn test_shared_secret_persists() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("infrafix.db")).await.unwrap();

    let first = load_shared_secret(&pool).await.unwrap();
    let second = load_shared_secret(&pool).await.unwrap();

    assert_ne!(first, 0);
    assert_eq!(first, second, "Secret must be generated once and reused");
}
