//! Contractor bid appraisal
//!
//! The language model is asked whether a bid is reasonable for the report it
//! targets. When the model is unreachable or answers with anything other than
//! a recognized verdict, the amount alone decides.

use std::str::FromStr;
use std::sync::Arc;

use infrafix_common::db::{BidEvaluation, Report};
use serde_json::Value;
use tracing::warn;

use super::language_model::{extract_json_payload, ChatMessage, LanguageModel};

/// Bids strictly below this amount are reasonable when the model is unavailable
pub const FALLBACK_THRESHOLD: f64 = 1000.0;

const BID_MAX_TOKENS: u32 = 100;
const ESTIMATOR_PROMPT: &str = "You are a construction cost estimator.";

pub fn fallback_evaluation(amount: f64) -> BidEvaluation {
    if amount < FALLBACK_THRESHOLD {
        BidEvaluation::Reasonable
    } else {
        BidEvaluation::Unreasonable
    }
}

pub struct BidEvaluator {
    language_model: Arc<dyn LanguageModel>,
}

impl BidEvaluator {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self { language_model }
    }

    pub async fn evaluate(&self, report: &Report, amount: f64, description: &str) -> BidEvaluation {
        let prompt = format!(
            "Report:\nTitle: {}\nCategory: {}\nDescription: {}\nSeverity: {}\nUrgency: {}\n\n\
             Contractor bid: {} - {}\n\n\
             Is this bid reasonable for the described work? \
             Respond with JSON: {{\"aiEvaluation\": \"Reasonable\" or \"Unreasonable\"}}",
            report.title,
            report.category,
            report.description,
            report.severity,
            report.urgency,
            amount,
            description
        );
        let messages = [ChatMessage::system(ESTIMATOR_PROMPT), ChatMessage::user(prompt)];

        match self.language_model.complete(&messages, BID_MAX_TOKENS).await {
            Ok(completion) => parse_bid_completion(&completion).unwrap_or_else(|| {
                warn!(completion = %completion, "Unrecognized bid verdict, using amount fallback");
                fallback_evaluation(amount)
            }),
            Err(e) => {
                warn!(error = %e, amount, "Bid evaluation failed, using amount fallback");
                fallback_evaluation(amount)
            }
        }
    }
}

/// Extract `aiEvaluation` from a completion
pub fn parse_bid_completion(completion: &str) -> Option<BidEvaluation> {
    let value: Value = serde_json::from_str(extract_json_payload(completion)).ok()?;
    let verdict = value.get("aiEvaluation")?.as_str()?;
    BidEvaluation::from_str(verdict.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::language_model::LanguageModelError;
    use async_trait::async_trait;
    use infrafix_common::db::ReportStatus;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            max_tokens: u32,
        ) -> Result<String, LanguageModelError> {
            assert_eq!(max_tokens, BID_MAX_TOKENS);
            self.prompts
                .lock()
                .unwrap()
                .extend(messages.iter().map(ChatMessage::text));
            self.reply
                .clone()
                .map_err(|_| LanguageModelError::ApiError(503, "busy".to_string()))
        }
    }

    fn report() -> Report {
        Report {
            id: 1,
            title: "Pothole".to_string(),
            description: "Deep hole".to_string(),
            category: "Road".to_string(),
            latitude: None,
            longitude: None,
            address: None,
            status: ReportStatus::Open,
            severity: "High".to_string(),
            urgency: "Within a week".to_string(),
            processed_image: None,
            user_id: 1,
            created_at: infrafix_common::time::now(),
        }
    }

    fn evaluator(reply: Result<String, ()>) -> (BidEvaluator, Arc<ScriptedModel>) {
        let model = Arc::new(ScriptedModel {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        (BidEvaluator::new(model.clone()), model)
    }

    #[test]
    fn test_fallback_threshold_is_strict() {
        assert_eq!(fallback_evaluation(999.99), BidEvaluation::Reasonable);
        assert_eq!(fallback_evaluation(1000.0), BidEvaluation::Unreasonable);
        assert_eq!(fallback_evaluation(0.01), BidEvaluation::Reasonable);
    }

    #[test]
    fn test_parse_bid_completion() {
        assert_eq!(
            parse_bid_completion("{\"aiEvaluation\": \"Unreasonable\"}"),
            Some(BidEvaluation::Unreasonable)
        );
        assert_eq!(
            parse_bid_completion("```json\n{\"aiEvaluation\":\"Reasonable\"}\n```"),
            Some(BidEvaluation::Reasonable)
        );
        assert_eq!(parse_bid_completion("{\"aiEvaluation\": \"Maybe\"}"), None);
        assert_eq!(parse_bid_completion("{}"), None);
        assert_eq!(parse_bid_completion("Reasonable"), None);
    }

    #[tokio::test]
    async fn test_model_verdict_wins_over_amount() {
        let (evaluator, model) = evaluator(Ok("{\"aiEvaluation\":\"Unreasonable\"}".to_string()));
        let verdict = evaluator.evaluate(&report(), 10.0, "Patch").await;
        assert_eq!(verdict, BidEvaluation::Unreasonable);

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts[0], ESTIMATOR_PROMPT);
        assert!(prompts[1].contains("Contractor bid: 10 - Patch"));
        assert!(prompts[1].contains("Severity: High"));
    }

    #[tokio::test]
    async fn test_unreachable_model_uses_fallback() {
        let (evaluator, _) = evaluator(Err(()));
        assert_eq!(
            evaluator.evaluate(&report(), 500.0, "Patch").await,
            BidEvaluation::Reasonable
        );
        assert_eq!(
            evaluator.evaluate(&report(), 1000.0, "Repave").await,
            BidEvaluation::Unreasonable
        );
    }

    #[tokio::test]
    async fn test_garbled_verdict_uses_fallback() {
        let (evaluator, _) = evaluator(Ok("I think it's fine".to_string()));
        assert_eq!(
            evaluator.evaluate(&report(), 2500.0, "Repave").await,
            BidEvaluation::Unreasonable
        );
    }
}
