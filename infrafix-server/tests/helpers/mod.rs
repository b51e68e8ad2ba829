//! Shared fixtures: temp database, fake external services, seeded users

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use infrafix_common::api::{hash_password, load_shared_secret};
use infrafix_common::db::{init_database, Role};
use infrafix_server::db::users;
use infrafix_server::services::identity::Caller;
use infrafix_server::services::language_model::{ChatMessage, LanguageModel, LanguageModelError};
use infrafix_server::services::vision::{VisionAnalyzer, VisionError};
use infrafix_server::uploads::{store_upload, StoredUpload};
use infrafix_server::{AppState, ServiceSettings};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Vision analyzer that prints a fixed line, or fails when `reply` is `None`
pub struct FakeVision {
    pub reply: Option<String>,
    pub calls: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl VisionAnalyzer for FakeVision {
    async fn analyze(&self, image: &Path, _output_dir: &Path) -> Result<String, VisionError> {
        self.calls.lock().unwrap().push(image.to_path_buf());
        self.reply.clone().ok_or(VisionError::ExitFailure {
            code: Some(1),
            stderr: "model missing".to_string(),
        })
    }
}

/// Language model with a fixed completion, or unreachable when `reply` is `None`
pub struct FakeLanguageModel {
    pub reply: Option<String>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl LanguageModel for FakeLanguageModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> Result<String, LanguageModelError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| LanguageModelError::NetworkError("connection refused".to_string()))
    }
}

pub struct TestContext {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub vision: Arc<FakeVision>,
    pub model: Arc<FakeLanguageModel>,
}

impl TestContext {
    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.upload_dir().join("output")
    }

    /// Insert a user directly and return it as an authenticated caller
    pub async fn user(&self, name: &str, role: Role) -> Caller {
        let email = format!("{}@example.com", name.to_lowercase());
        let user = users::insert_user(&self.pool, name, &email, &hash_password("pw").unwrap(), role)
            .await
            .unwrap();
        Caller {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }

    /// Write a fake image into the upload directory
    pub async fn upload(&self, file_name: &str) -> StoredUpload {
        store_upload(&self.upload_dir(), Some(file_name), b"\xff\xd8\xff fake jpeg")
            .await
            .unwrap()
    }

    pub async fn count(&self, table: &str, report_id: i64) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE report_id = ?", table))
            .bind(report_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// Fresh database and state; `None` replies make the fake service fail
pub async fn setup(vision_reply: Option<&str>, model_reply: Option<&str>) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("infrafix.db")).await.unwrap();
    let shared_secret = load_shared_secret(&pool).await.unwrap();

    let vision = Arc::new(FakeVision {
        reply: vision_reply.map(str::to_string),
        calls: Mutex::new(Vec::new()),
    });
    let model = Arc::new(FakeLanguageModel {
        reply: model_reply.map(str::to_string),
        calls: Mutex::new(Vec::new()),
    });

    let upload_dir = dir.path().join("uploads");
    let state = AppState::new(
        pool.clone(),
        ServiceSettings {
            shared_secret,
            token_ttl_days: 7,
            vision_output_dir: upload_dir.join("output"),
            upload_dir,
        },
        vision.clone(),
        model.clone(),
    );

    TestContext {
        dir,
        pool,
        state,
        vision,
        model,
    }
}
