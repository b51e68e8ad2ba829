//! infrafix-server - civic infrastructure issue reporting service
//!
//! `infrafix-server [--config PATH] [--bind ADDR] [serve]` runs the HTTP API;
//! `infrafix-server create-admin --name N --email E --password P` provisions
//! an administrator account.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use infrafix_common::api::load_shared_secret;
use infrafix_common::config::{load_config, InfraFixConfig};
use infrafix_common::db::init_database;
use infrafix_server::services::{IdentityService, OpenAiChatClient, ProcessVisionAnalyzer};
use infrafix_server::{build_router, AppState, ServiceSettings};
use tokio::signal;
use tracing::{error, info, warn};

/// Command-line arguments for infrafix-server
#[derive(Parser, Debug)]
#[command(name = "infrafix-server")]
#[command(about = "Civic infrastructure issue reporting API")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides INFRAFIX_CONFIG and default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides configuration
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,infrafix_server=debug,tower_http=info".into()),
        )
        .init();

    // Log build identification before any slow startup work
    info!(
        "Starting InfraFix server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let shared_secret = load_shared_secret(&pool)
        .await
        .context("Failed to load token signing secret")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool, shared_secret).await,
        Command::CreateAdmin {
            name,
            email,
            password,
        } => {
            let identity = IdentityService::new(pool, shared_secret, config.auth.token_ttl_days);
            let user = identity
                .create_admin(&name, &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create administrator: {}", e))?;
            info!("✓ Administrator {} <{}> created (id {})", user.name, user.email, user.id);
            Ok(())
        }
    }
}

async fn serve(config: InfraFixConfig, pool: sqlx::SqlitePool, shared_secret: i64) -> Result<()> {
    let upload_dir = config.upload_dir();
    let output_dir = config.vision_output_dir();
    for dir in [&upload_dir, &output_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    info!("Upload directory: {}", upload_dir.display());

    if config.language_model.api_key.is_none() {
        warn!("No language model API key configured; enrichment and bid appraisal use fallbacks");
    }

    let vision = Arc::new(ProcessVisionAnalyzer::new(&config.vision));
    let language_model = Arc::new(
        OpenAiChatClient::new(&config.language_model)
            .context("Failed to build language model client")?,
    );

    let state = AppState::new(
        pool,
        ServiceSettings {
            shared_secret,
            token_ttl_days: config.auth.token_ttl_days,
            upload_dir,
            vision_output_dir: output_dir,
        },
        vision,
        language_model,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_address))?;
    info!("infrafix-server listening on http://{}", config.server.bind_address);
    info!("Health check: http://{}/health", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
