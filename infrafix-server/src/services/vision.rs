//! Vision analyzer port and subprocess client
//!
//! The analyzer is an external image-classification script invoked as
//! `<interpreter> <script> <input_image> <output_dir> <model_path>`. It
//! writes an annotated copy of the image below `output_dir` and prints one
//! line `severity|processed_image_path` on stdout.

use async_trait::async_trait;
use infrafix_common::config::VisionConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::uploads::PUBLIC_PREFIX;

/// Vision analyzer errors
#[derive(Debug, Error)]
pub enum VisionError {
    /// Interpreter could not be started
    #[error("Failed to start vision process: {0}")]
    SpawnFailed(String),

    /// Process exceeded its time budget and was killed
    #[error("Vision process timed out after {0:?}")]
    Timeout(Duration),

    /// Process exited unsuccessfully
    #[error("Vision process failed (exit code {code:?}): {stderr}")]
    ExitFailure { code: Option<i32>, stderr: String },
}

/// Image classification port
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Run the analyzer and return its stdout
    async fn analyze(&self, image: &Path, output_dir: &Path) -> Result<String, VisionError>;
}

/// Runs the classification script as a child process
pub struct ProcessVisionAnalyzer {
    interpreter: String,
    script: PathBuf,
    model_path: PathBuf,
    timeout: Duration,
}

impl ProcessVisionAnalyzer {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
            model_path: config.model_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for ProcessVisionAnalyzer {
    async fn analyze(&self, image: &Path, output_dir: &Path) -> Result<String, VisionError> {
        tracing::debug!(
            image = %image.display(),
            output_dir = %output_dir.display(),
            "Running vision analysis"
        );

        let child = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(image)
            .arg(output_dir)
            .arg(&self.model_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VisionError::SpawnFailed(e.to_string()))?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VisionError::Timeout(self.timeout))?
            .map_err(|e| VisionError::SpawnFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            // A verdict printed before a failing exit still counts
            if stdout.trim().is_empty() {
                return Err(VisionError::ExitFailure {
                    code: output.status.code(),
                    stderr: stderr.trim().to_string(),
                });
            }
            tracing::warn!(
                code = ?output.status.code(),
                stderr = %stderr.trim(),
                "Vision process exited unsuccessfully, parsing its output anyway"
            );
        } else if !stderr.trim().is_empty() {
            tracing::warn!(stderr = %stderr.trim(), "Vision process wrote to stderr");
        }

        Ok(stdout)
    }
}

/// Parsed analyzer output line
#[derive(Debug, Clone, PartialEq)]
pub struct VisionVerdict {
    /// `None` when the process printed nothing usable
    pub severity: Option<String>,
    /// Public reference for the annotated image
    pub processed_image: Option<String>,
}

/// Parse `severity|path` from the last non-empty stdout line
///
/// `served_root` is the directory published under `/uploads`.
pub fn parse_vision_output(stdout: &str, served_root: &Path) -> VisionVerdict {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("");

    let mut parts = line.splitn(2, '|');
    let severity = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let processed_image = parts
        .next()
        .and_then(|path| served_image_ref(served_root, path));

    VisionVerdict {
        severity,
        processed_image,
    }
}

/// Public reference for a file below the served upload directory
///
/// Paths outside `served_root` fall back to [`public_image_ref`].
pub fn served_image_ref(served_root: &Path, processed_path: &str) -> Option<String> {
    let trimmed = processed_path.trim();
    if let Ok(relative) = Path::new(trimmed).strip_prefix(served_root) {
        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        if !segments.is_empty() {
            return Some(format!("{}/{}", PUBLIC_PREFIX, segments.join("/")));
        }
    }
    public_image_ref(trimmed)
}

/// Rewrite a filesystem path into a reference under the public `/uploads` prefix
///
/// Everything before the first `/uploads/` segment is dropped; failing that,
/// everything before `/output/` is replaced by `/uploads`. Paths with neither
/// segment have no public reference.
pub fn public_image_ref(processed_path: &str) -> Option<String> {
    let normalized = processed_path.trim().replace('\\', "/");
    if normalized.is_empty() {
        return None;
    }

    if let Some(idx) = normalized.find("/uploads/") {
        return Some(normalized[idx..].to_string());
    }

    normalized
        .find("/output/")
        .map(|idx| format!("/uploads{}", &normalized[idx..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let verdict = parse_vision_output("HIGH|/srv/app/uploads/output/results/a.jpg\n", Path::new("/srv/app/uploads"));
        assert_eq!(verdict.severity.as_deref(), Some("HIGH"));
        assert_eq!(
            verdict.processed_image.as_deref(),
            Some("/uploads/output/results/a.jpg")
        );
    }

    #[test]
    fn test_parse_uses_last_line() {
        let verdict = parse_vision_output(
            "loading model...\nMEDIUM|/x/uploads/output/results/b.png\n\n",
            Path::new("/elsewhere"),
        );
        assert_eq!(verdict.severity.as_deref(), Some("MEDIUM"));
        assert_eq!(
            verdict.processed_image.as_deref(),
            Some("/uploads/output/results/b.png")
        );
    }

    #[test]
    fn test_parse_empty_output() {
        let verdict = parse_vision_output("", Path::new("/srv/app/uploads"));
        assert_eq!(verdict.severity, None);
        assert_eq!(verdict.processed_image, None);
    }

    #[test]
    fn test_parse_severity_without_path() {
        let verdict = parse_vision_output("HIGH", Path::new("/srv/app/uploads"));
        assert_eq!(verdict.severity.as_deref(), Some("HIGH"));
        assert_eq!(verdict.processed_image, None);
    }

    #[test]
    fn test_public_ref_windows_path() {
        assert_eq!(
            public_image_ref(r"C:\app\uploads\output\results\c.jpg").as_deref(),
            Some("/uploads/output/results/c.jpg")
        );
    }

    #[test]
    fn test_public_ref_output_segment_only() {
        assert_eq!(
            public_image_ref("/data/infrafix/files/output/results/d.jpg").as_deref(),
            Some("/uploads/output/results/d.jpg")
        );
        // Relative path lacks the leading slash before "uploads"
        assert_eq!(
            public_image_ref("uploads/output/results/e.jpg").as_deref(),
            Some("/uploads/output/results/e.jpg")
        );
    }

    #[test]
    fn test_served_ref_strips_upload_root_first() {
        // Data directory itself named "uploads"
        let root = Path::new("/srv/uploads/uploads");
        assert_eq!(
            served_image_ref(root, "/srv/uploads/uploads/output/results/a.jpg").as_deref(),
            Some("/uploads/output/results/a.jpg")
        );
        let verdict = parse_vision_output("HIGH|/srv/uploads/uploads/output/results/a.jpg", root);
        assert_eq!(
            verdict.processed_image.as_deref(),
            Some("/uploads/output/results/a.jpg")
        );
    }

    #[test]
    fn test_served_ref_outside_root_uses_segments() {
        let root = Path::new("/srv/infrafix/uploads");
        assert_eq!(
            served_image_ref(root, "/opt/ml/output/results/b.jpg").as_deref(),
            Some("/uploads/output/results/b.jpg")
        );
        assert_eq!(served_image_ref(root, "/srv/infrafix/uploads"), None);
    }

    #[test]
    fn test_public_ref_unrecognized() {
        assert_eq!(public_image_ref("/tmp/results/f.jpg"), None);
        assert_eq!(public_image_ref("   "), None);
    }

    #[cfg(unix)]
    fn script_analyzer(dir: &Path, body: &str) -> ProcessVisionAnalyzer {
        let script = dir.join("classify.sh");
        std::fs::write(&script, body).unwrap();
        ProcessVisionAnalyzer::new(&VisionConfig {
            interpreter: "sh".to_string(),
            script,
            timeout_secs: 10,
            ..VisionConfig::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_exit_keeps_printed_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = script_analyzer(
            dir.path(),
            "echo 'HIGH|/srv/uploads/output/results/a.jpg'\necho 'cuda warning' >&2\nexit 3\n",
        );
        let stdout = analyzer
            .analyze(Path::new("/tmp/in.jpg"), dir.path())
            .await
            .unwrap();
        let verdict = parse_vision_output(&stdout, Path::new("/srv/uploads"));
        assert_eq!(verdict.severity.as_deref(), Some("HIGH"));
        assert_eq!(
            verdict.processed_image.as_deref(),
            Some("/uploads/output/results/a.jpg")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_exit_without_output_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = script_analyzer(dir.path(), "echo 'model missing' >&2\nexit 2\n");
        let result = analyzer
            .analyze(Path::new("/tmp/in.jpg"), dir.path())
            .await;
        assert!(matches!(
            result,
            Err(VisionError::ExitFailure { code: Some(2), .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_failure() {
        let analyzer = ProcessVisionAnalyzer::new(&VisionConfig {
            interpreter: "/nonexistent/interpreter".to_string(),
            ..VisionConfig::default()
        });
        let result = analyzer
            .analyze(Path::new("/tmp/in.jpg"), Path::new("/tmp/out"))
            .await;
        assert!(matches!(result, Err(VisionError::SpawnFailed(_))));
    }
}
