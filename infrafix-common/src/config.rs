//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `INFRAFIX_CONFIG` environment variable
//! 3. User config file (`~/.config/infrafix/config.toml` on Linux)
//! 4. System config file (`/etc/infrafix/config.toml`, Linux only)
//! 5. Compiled defaults
//!
//! Individual environment variables are applied on top of whichever source
//! won, so secrets such as `OPENAI_API_KEY` never need to live in a file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "INFRAFIX_CONFIG";
pub const BIND_ENV_VAR: &str = "INFRAFIX_BIND";
pub const DATA_DIR_ENV_VAR: &str = "INFRAFIX_DATA_DIR";
pub const LLM_API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
pub const LLM_API_BASE_ENV_VAR: &str = "INFRAFIX_LLM_API_BASE";
pub const LLM_MODEL_ENV_VAR: &str = "INFRAFIX_LLM_MODEL";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraFixConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub vision: VisionConfig,
    pub language_model: LanguageModelConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database_file: String,
    /// Defaults to `<data_dir>/uploads`
    pub upload_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            database_file: "infrafix.db".to_string(),
            upload_dir: None,
        }
    }
}

/// External image-classification process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub interpreter: String,
    pub script: PathBuf,
    pub model_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script: PathBuf::from("ml/pothole_inference.py"),
            model_path: PathBuf::from("ml/best.pt"),
            timeout_secs: 60,
        }
    }
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { token_ttl_days: 7 }
    }
}

impl InfraFixConfig {
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database_file)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.storage
            .upload_dir
            .clone()
            .unwrap_or_else(|| self.storage.data_dir.join("uploads"))
    }

    /// Directory the vision process writes annotated images into
    pub fn vision_output_dir(&self) -> PathBuf {
        self.upload_dir().join("output")
    }
}

/// Parse configuration from TOML text
pub fn parse_config(toml_content: &str) -> Result<InfraFixConfig> {
    toml::from_str(toml_content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Resolve, read and parse configuration, then apply environment overrides
pub fn load_config(cli_arg: Option<&Path>) -> Result<InfraFixConfig> {
    let mut config = match resolve_config_path(cli_arg)? {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Read config {} failed: {}", path.display(), e))
            })?;
            info!("Loaded configuration from {}", path.display());
            parse_config(&content)?
        }
        None => {
            info!("No configuration file found, using defaults");
            InfraFixConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Pick the config file to read, if any
///
/// An explicitly requested file (CLI or environment) must exist; the
/// well-known locations are optional.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_exists(path.to_path_buf()).map(Some);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return require_exists(PathBuf::from(path)).map(Some);
        }
    }

    // Priority 3: User config file
    if let Some(path) = dirs::config_dir().map(|d| d.join("infrafix").join("config.toml")) {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // Priority 4: System config file
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/infrafix/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    // Priority 5: compiled defaults
    Ok(None)
}

fn require_exists(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

/// Apply individual environment variable overrides
pub fn apply_env_overrides(config: &mut InfraFixConfig) {
    if let Some(bind) = non_empty_env(BIND_ENV_VAR) {
        config.server.bind_address = bind;
    }
    if let Some(dir) = non_empty_env(DATA_DIR_ENV_VAR) {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(key) = non_empty_env(LLM_API_KEY_ENV_VAR) {
        config.language_model.api_key = Some(key);
    }
    if let Some(base) = non_empty_env(LLM_API_BASE_ENV_VAR) {
        config.language_model.api_base = base;
    }
    if let Some(model) = non_empty_env(LLM_MODEL_ENV_VAR) {
        config.language_model.model = model;
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get OS-dependent default data folder
fn get_default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/infrafix (or /var/lib/infrafix for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("infrafix"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/infrafix"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("infrafix"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/infrafix"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("infrafix"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\infrafix"))
    } else {
        PathBuf::from("./infrafix_data")
    }
}
