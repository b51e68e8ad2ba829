//! infrafix-server library - civic infrastructure issue reporting service
//!
//! Citizens submit reports with photos and location, other users upvote and
//! comment, administrators triage status, and contractors bid on repairs.
//! New reports are enriched with severity and urgency by an external vision
//! analyzer or language model; bids are appraised by the language model.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod uploads;

use services::{
    BidEvaluator, EnrichmentGateway, IdentityService, LanguageModel, ReportLifecycle,
    VisionAnalyzer,
};

/// Upper bound for a multipart report submission
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub identity: Arc<IdentityService>,
    pub reports: Arc<ReportLifecycle>,
    /// Directory uploads are written to and served from
    pub upload_dir: PathBuf,
}

/// Everything needed to wire the services together
pub struct ServiceSettings {
    pub shared_secret: i64,
    pub token_ttl_days: i64,
    pub upload_dir: PathBuf,
    pub vision_output_dir: PathBuf,
}

impl AppState {
    /// Build the state with explicitly supplied external-service ports
    pub fn new(
        db: SqlitePool,
        settings: ServiceSettings,
        vision: Arc<dyn VisionAnalyzer>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Self {
        let identity = IdentityService::new(db.clone(), settings.shared_secret, settings.token_ttl_days);
        let enrichment = EnrichmentGateway::new(
            vision,
            language_model.clone(),
            settings.vision_output_dir,
            settings.upload_dir.clone(),
        );
        let bid_evaluator = BidEvaluator::new(language_model);
        let reports = ReportLifecycle::new(db.clone(), enrichment, bid_evaluator);

        Self {
            db,
            identity: Arc::new(identity),
            reports: Arc::new(reports),
            upload_dir: settings.upload_dir,
        }
    }
}

/// Build application router
///
/// Public: banner, health, uploaded files, register/login, report listing
/// and bid listing. Everything else requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/auth/me", get(api::me))
        .route("/api/reports", post(api::create_report))
        .route(
            "/api/reports/:id",
            get(api::get_report)
                .put(api::update_report)
                .delete(api::delete_report),
        )
        .route("/api/reports/:id/comment", post(api::add_comment))
        .route("/api/reports/:id/upvote", post(api::toggle_upvote))
        .route("/api/reports/:id/status", post(api::set_status))
        .route("/api/reports/:id/bids", post(api::place_bid))
        .route("/api/reports/bids/:bid_id", delete(api::delete_bid))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login))
        .route("/api/reports", get(api::list_reports))
        .route("/api/reports/:id/bids", get(api::list_bids))
        .merge(api::health_routes())
        .nest_service("/uploads", ServeDir::new(&state.upload_dir));

    // Paths shared by both routers merge per method
    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
