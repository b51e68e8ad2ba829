//! Severity/urgency enrichment for newly created reports
//!
//! Reports in the road category with at least one image go to the vision analyzer; every
//! other report is described to the language model. Neither path can fail:
//! any external error yields the fallback `{Medium, "Within a week"}`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::language_model::{
    extract_json_payload, image_data_url, ChatMessage, ContentPart, ImageUrl, LanguageModel,
};
use super::vision::{parse_vision_output, VisionAnalyzer};

pub const DEFAULT_SEVERITY: &str = "Medium";
pub const DEFAULT_URGENCY: &str = "Within a week";

const ENRICHMENT_MAX_TOKENS: u32 = 150;
const INSPECTOR_PROMPT: &str =
    "You are an expert infrastructure inspector. Analyze severity and urgency.";

/// Attributes written onto a report at creation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub severity: String,
    pub urgency: String,
    pub processed_image: Option<String>,
}

impl Enrichment {
    pub fn fallback() -> Self {
        Self {
            severity: DEFAULT_SEVERITY.to_string(),
            urgency: DEFAULT_URGENCY.to_string(),
            processed_image: None,
        }
    }
}

/// Report fields shown to the analyzers
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    /// Stored upload files, in submission order
    pub images: &'a [PathBuf],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentPath {
    Vision,
    LanguageModel,
}

/// Pick the analyzer for a report
pub fn choose_path(category: &str, image_count: usize) -> EnrichmentPath {
    if image_count > 0 && category.eq_ignore_ascii_case("road") {
        EnrichmentPath::Vision
    } else {
        EnrichmentPath::LanguageModel
    }
}

pub struct EnrichmentGateway {
    vision: Arc<dyn VisionAnalyzer>,
    language_model: Arc<dyn LanguageModel>,
    output_dir: PathBuf,
    /// Directory published under `/uploads`
    served_root: PathBuf,
}

impl EnrichmentGateway {
    pub fn new(
        vision: Arc<dyn VisionAnalyzer>,
        language_model: Arc<dyn LanguageModel>,
        output_dir: PathBuf,
        served_root: PathBuf,
    ) -> Self {
        Self {
            vision,
            language_model,
            output_dir,
            served_root,
        }
    }

    pub async fn enrich(&self, input: EnrichmentInput<'_>) -> Enrichment {
        let path = choose_path(input.category, input.images.len());
        debug!(category = %input.category, images = input.images.len(), ?path, "Enriching report");

        match (path, input.images.first()) {
            (EnrichmentPath::Vision, Some(first)) => self.enrich_with_vision(first).await,
            _ => self.enrich_with_language_model(&input).await,
        }
    }

    async fn enrich_with_vision(&self, image: &Path) -> Enrichment {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(dir = %self.output_dir.display(), error = %e, "Cannot create vision output directory");
            return Enrichment::fallback();
        }

        match self.vision.analyze(image, &self.output_dir).await {
            Ok(stdout) => {
                let verdict = parse_vision_output(&stdout, &self.served_root);
                Enrichment {
                    severity: verdict
                        .severity
                        .unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
                    urgency: DEFAULT_URGENCY.to_string(),
                    processed_image: verdict.processed_image,
                }
            }
            Err(e) => {
                warn!(error = %e, "Vision analysis failed, using fallback enrichment");
                Enrichment::fallback()
            }
        }
    }

    async fn enrich_with_language_model(&self, input: &EnrichmentInput<'_>) -> Enrichment {
        let mut parts = vec![ContentPart::Text {
            text: format!(
                "Title: {}\nDescription: {}\nCategory: {}",
                input.title, input.description, input.category
            ),
        }];

        if let Some(first) = input.images.first() {
            match tokio::fs::read(first).await {
                Ok(bytes) => parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url(&bytes),
                    },
                }),
                Err(e) => {
                    warn!(image = %first.display(), error = %e, "Cannot read image for language model")
                }
            }
        }

        let messages = [
            ChatMessage::system(INSPECTOR_PROMPT),
            ChatMessage::user_parts(parts),
        ];

        match self
            .language_model
            .complete(&messages, ENRICHMENT_MAX_TOKENS)
            .await
        {
            Ok(completion) => parse_enrichment_completion(&completion),
            Err(e) => {
                warn!(error = %e, "Language model enrichment failed, using fallback");
                Enrichment::fallback()
            }
        }
    }
}

/// Read `{severity, urgency}` from a completion, defaulting per field
pub fn parse_enrichment_completion(completion: &str) -> Enrichment {
    let value: Value = match serde_json::from_str(extract_json_payload(completion)) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Language model returned non-JSON enrichment");
            return Enrichment::fallback();
        }
    };

    let field = |name: &str, default: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    Enrichment {
        severity: field("severity", DEFAULT_SEVERITY),
        urgency: field("urgency", DEFAULT_URGENCY),
        processed_image: None,
    }
}
