//! Uploaded image storage
//!
//! Files land directly in the upload directory under generated names
//! `<unix_millis>_<10 random alphanumerics><.ext>` and are served back
//! under [`PUBLIC_PREFIX`].

use std::path::{Path, PathBuf};

use infrafix_common::time::unix_millis;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

pub const PUBLIC_PREFIX: &str = "/uploads";

const SUFFIX_LEN: usize = 10;

/// A stored upload
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    /// Location on disk, handed to the analyzers
    pub disk_path: PathBuf,
    /// Reference persisted in the images table
    pub public_url: String,
}

/// Generate a collision-resistant file name, keeping a plain alphanumeric extension
pub fn generate_file_name(original_name: Option<&str>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();

    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}_{}{}", unix_millis(), suffix, extension)
}

/// Write an uploaded file and return its disk path and public reference
pub async fn store_upload(
    upload_dir: &Path,
    original_name: Option<&str>,
    bytes: &[u8],
) -> std::io::Result<StoredUpload> {
    tokio::fs::create_dir_all(upload_dir).await?;

    let file_name = generate_file_name(original_name);
    let disk_path = upload_dir.join(&file_name);
    tokio::fs::write(&disk_path, bytes).await?;

    debug!(path = %disk_path.display(), size = bytes.len(), "Stored upload");

    Ok(StoredUpload {
        disk_path,
        public_url: format!("{}/{}", PUBLIC_PREFIX, file_name),
    })
}

/// Best-effort removal of files whose report was never committed
pub async fn discard_uploads(uploads: &[StoredUpload]) {
    for upload in uploads {
        if let Err(e) = tokio::fs::remove_file(&upload.disk_path).await {
            tracing::warn!(path = %upload.disk_path.display(), error = %e, "Failed to remove orphaned upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_name_shape() {
        let name = generate_file_name(Some("Pothole.JPG"));
        let (millis, rest) = name.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(rest.ends_with(".jpg"));
        let suffix = rest.trim_end_matches(".jpg");
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generated_name_drops_odd_extensions() {
        assert!(!generate_file_name(Some("photo")).contains('.'));
        assert!(!generate_file_name(Some("x.j p g")).contains('.'));
        assert!(!generate_file_name(None).contains('.'));
    }

    #[test]
    fn test_generated_names_differ() {
        assert_ne!(generate_file_name(None), generate_file_name(None));
    }

    #[tokio::test]
    async fn test_store_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");

        let stored = store_upload(&upload_dir, Some("a.png"), b"png-bytes").await.unwrap();

        assert!(stored.public_url.starts_with("/uploads/"));
        assert!(stored.public_url.ends_with(".png"));
        assert_eq!(std::fs::read(&stored.disk_path).unwrap(), b"png-bytes");
        assert_eq!(stored.disk_path.parent().unwrap(), upload_dir);

        discard_uploads(std::slice::from_ref(&stored)).await;
        assert!(!stored.disk_path.exists());
    }
}
