//! Domain services and external-service ports

pub mod bid_evaluation;
pub mod enrichment;
pub mod identity;
pub mod language_model;
pub mod lifecycle;
pub mod vision;

pub use bid_evaluation::BidEvaluator;
pub use enrichment::{Enrichment, EnrichmentGateway};
pub use identity::{Caller, IdentityService};
pub use language_model::{LanguageModel, OpenAiChatClient};
pub use lifecycle::ReportLifecycle;
pub use vision::{ProcessVisionAnalyzer, VisionAnalyzer};
