//! Report lifecycle manager
//!
//! Owns every mutation of reports and their sub-entities (images, comments,
//! upvotes, bids). Multi-row mutations run in a single transaction; the
//! manager itself holds no locks and relies on SQLite for serialization.
//!
//! # Status
//!
//! `OPEN` on creation; any-to-any transitions, only by administrators.

use infrafix_common::db::{Bid, Comment, Report, ReportStatus};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::bid_evaluation::BidEvaluator;
use super::enrichment::{EnrichmentGateway, EnrichmentInput};
use super::identity::Caller;
use crate::db::reports::{NewReportRow, ReportDetail, ReportFilter, ReportView};
use crate::db::{bids, comments, images, reports, upvotes};
use crate::error::{ApiError, ApiResult};
use crate::uploads::StoredUpload;

/// Fields of a report submission
#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub title: String,
    pub description: String,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
}

impl NewReport {
    /// Title, description and category are required
    pub fn validate(&self) -> ApiResult<()> {
        if self.title.trim().is_empty()
            || self.description.trim().is_empty()
            || self.category.trim().is_empty()
        {
            return Err(ApiError::Validation(
                "Title, description, and category are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their stored value
///
/// The optional location fields distinguish absent (`None`) from an
/// explicit JSON `null` (`Some(None)`), which clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub address: Option<Option<String>>,
    pub status: Option<String>,
    /// Full replacement of the image list when present
    pub images: Option<Vec<String>>,
}

/// Any value that is present, `null` included, becomes `Some`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Listing query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceBid {
    /// JSON number, or a numeric string
    pub amount: Option<Value>,
    pub description: Option<String>,
}

/// Bid amount as a finite positive number
pub fn parse_bid_amount(amount: Option<&Value>) -> ApiResult<f64> {
    let invalid = || ApiError::Validation("Bid amount must be a positive number".to_string());

    let parsed = match amount {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(invalid()),
    }
}

fn non_blank(field: &str, value: Option<String>) -> ApiResult<Option<String>> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(ApiError::Validation(format!("{} must not be empty", field)))
        }
        other => Ok(other),
    }
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Report {} not found", id))
}

pub struct ReportLifecycle {
    db: SqlitePool,
    enrichment: EnrichmentGateway,
    bid_evaluator: BidEvaluator,
}

impl ReportLifecycle {
    pub fn new(db: SqlitePool, enrichment: EnrichmentGateway, bid_evaluator: BidEvaluator) -> Self {
        Self {
            db,
            enrichment,
            bid_evaluator,
        }
    }

    async fn require_report(&self, id: i64) -> ApiResult<Report> {
        reports::find_report(&self.db, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn view(&self, id: i64) -> ApiResult<ReportView> {
        reports::load_view(&self.db, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Enrich and persist a report with its already-stored uploads
    pub async fn create(
        &self,
        caller: &Caller,
        report: NewReport,
        uploads: &[StoredUpload],
    ) -> ApiResult<ReportView> {
        report.validate()?;

        let image_paths: Vec<_> = uploads.iter().map(|u| u.disk_path.clone()).collect();
        let enrichment = self
            .enrichment
            .enrich(EnrichmentInput {
                title: &report.title,
                description: &report.description,
                category: &report.category,
                images: &image_paths,
            })
            .await;

        let urls: Vec<String> = uploads.iter().map(|u| u.public_url.clone()).collect();

        let mut tx = self.db.begin().await?;
        let id = reports::insert_report(
            &mut *tx,
            &NewReportRow {
                title: &report.title,
                description: &report.description,
                category: &report.category,
                latitude: report.latitude,
                longitude: report.longitude,
                address: report.address.as_deref(),
                severity: &enrichment.severity,
                urgency: &enrichment.urgency,
                processed_image: enrichment.processed_image.as_deref(),
                user_id: caller.id,
            },
        )
        .await?;
        images::insert_images(&mut *tx, id, &urls).await?;
        tx.commit().await?;

        info!(
            report_id = id,
            user_id = caller.id,
            severity = %enrichment.severity,
            images = urls.len(),
            "Created report"
        );
        self.view(id).await
    }

    /// Owner or administrator; status changes need an administrator
    pub async fn update(&self, caller: &Caller, id: i64, update: ReportUpdate) -> ApiResult<ReportView> {
        let mut report = self.require_report(id).await?;
        if report.user_id != caller.id && !caller.is_admin() {
            return Err(ApiError::Forbidden("Not allowed".to_string()));
        }

        if let Some(status) = update.status.as_deref().filter(|s| !s.is_empty()) {
            if !caller.is_admin() {
                return Err(ApiError::Forbidden(
                    "Only administrators may change status".to_string(),
                ));
            }
            report.status = status.parse::<ReportStatus>()?;
        }

        if let Some(title) = non_blank("Title", update.title)? {
            report.title = title;
        }
        if let Some(description) = non_blank("Description", update.description)? {
            report.description = description;
        }
        if let Some(category) = non_blank("Category", update.category)? {
            report.category = category;
        }
        if let Some(latitude) = update.latitude {
            report.latitude = latitude;
        }
        if let Some(longitude) = update.longitude {
            report.longitude = longitude;
        }
        if let Some(address) = update.address {
            report.address = address.filter(|a| !a.trim().is_empty());
        }

        let mut tx = self.db.begin().await?;
        reports::update_report_fields(&mut *tx, &report).await?;
        if let Some(urls) = &update.images {
            images::delete_images_for_report(&mut *tx, id).await?;
            images::insert_images(&mut *tx, id, urls).await?;
        }
        tx.commit().await?;

        debug!(report_id = id, replaced_images = update.images.is_some(), "Updated report");
        self.view(id).await
    }

    /// Administrator-only removal of the report and everything referencing it
    pub async fn delete(&self, caller: &Caller, id: i64) -> ApiResult<()> {
        self.require_report(id).await?;
        if !caller.is_admin() {
            return Err(ApiError::Forbidden("Admin only".to_string()));
        }

        let mut tx = self.db.begin().await?;
        let removed_comments = comments::delete_comments_for_report(&mut *tx, id).await?;
        let removed_upvotes = upvotes::delete_upvotes_for_report(&mut *tx, id).await?;
        let removed_bids = bids::delete_bids_for_report(&mut *tx, id).await?;
        let removed_images = images::delete_images_for_report(&mut *tx, id).await?;
        if !reports::delete_report_row(&mut *tx, id).await? {
            return Err(not_found(id));
        }
        tx.commit().await?;

        info!(
            report_id = id,
            removed_comments,
            removed_upvotes,
            removed_bids,
            removed_images,
            "Deleted report"
        );
        Ok(())
    }

    pub async fn list(&self, query: ReportQuery) -> ApiResult<Vec<ReportView>> {
        let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(raw.parse::<ReportStatus>()?),
            None => None,
        };
        let filter = ReportFilter {
            status,
            category: query.category,
            q: query.q,
        };
        Ok(reports::list_reports(&self.db, &filter).await?)
    }

    pub async fn get(&self, caller: &Caller, id: i64) -> ApiResult<ReportDetail> {
        reports::load_detail(&self.db, id, caller.id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Flip the caller's upvote and return the refreshed detail view
    pub async fn toggle_upvote(&self, caller: &Caller, id: i64) -> ApiResult<ReportDetail> {
        self.require_report(id).await?;

        let mut tx = self.db.begin().await?;
        let upvoted = upvotes::toggle_upvote(&mut *tx, caller.id, id).await?;
        tx.commit().await?;

        debug!(report_id = id, user_id = caller.id, upvoted, "Toggled upvote");
        self.get(caller, id).await
    }

    pub async fn set_status(&self, caller: &Caller, id: i64, status: Option<&str>) -> ApiResult<ReportView> {
        if !caller.is_admin() {
            return Err(ApiError::Forbidden("Admin only".to_string()));
        }
        let status = status
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Validation("Status is required".to_string()))?
            .parse::<ReportStatus>()?;

        if !reports::set_status(&self.db, id, status).await? {
            return Err(not_found(id));
        }

        info!(report_id = id, status = %status, "Changed report status");
        self.view(id).await
    }

    pub async fn add_comment(&self, caller: &Caller, id: i64, text: Option<&str>) -> ApiResult<Comment> {
        let text = text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("Comment text required".to_string()))?;
        self.require_report(id).await?;

        let comment_id = comments::insert_comment(&self.db, id, caller.id, text).await?;
        comments::find_comment(&self.db, comment_id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Comment {} vanished after insert", comment_id)))
    }

    /// Contractor-only; the evaluation is computed once and stored with the bid
    pub async fn place_bid(&self, caller: &Caller, id: i64, bid: PlaceBid) -> ApiResult<Bid> {
        if !caller.is_contractor() {
            return Err(ApiError::Forbidden("Only contractors can bid".to_string()));
        }
        let amount = parse_bid_amount(bid.amount.as_ref())?;
        let description = bid
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("Bid description required".to_string()))?;
        let report = self.require_report(id).await?;

        let evaluation = self.bid_evaluator.evaluate(&report, amount, &description).await;
        let bid_id = bids::insert_bid(&self.db, id, caller.id, amount, &description, evaluation).await?;

        info!(report_id = id, bid_id, amount, evaluation = %evaluation, "Placed bid");
        bids::find_bid(&self.db, bid_id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Bid {} vanished after insert", bid_id)))
    }

    /// Empty for unknown reports
    pub async fn list_bids(&self, id: i64) -> ApiResult<Vec<Bid>> {
        Ok(bids::bids_for_report(&self.db, id).await?)
    }

    /// Only the contractor who placed a bid may withdraw it
    pub async fn delete_bid(&self, caller: &Caller, bid_id: i64) -> ApiResult<()> {
        let bid = bids::find_bid(&self.db, bid_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Bid {} not found", bid_id)))?;
        if bid.contractor_id != caller.id {
            return Err(ApiError::Forbidden("Not allowed".to_string()));
        }

        bids::delete_bid(&self.db, bid_id).await?;
        debug!(bid_id, report_id = bid.report_id, "Deleted bid");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bid_amount() {
        assert_eq!(parse_bid_amount(Some(&json!(500))).unwrap(), 500.0);
        assert_eq!(parse_bid_amount(Some(&json!("999.99"))).unwrap(), 999.99);
        assert!(parse_bid_amount(Some(&json!(0))).is_err());
        assert!(parse_bid_amount(Some(&json!(-5.0))).is_err());
        assert!(parse_bid_amount(Some(&json!("NaN"))).is_err());
        assert!(parse_bid_amount(Some(&json!("inf"))).is_err());
        assert!(parse_bid_amount(Some(&json!("abc"))).is_err());
        assert!(parse_bid_amount(None).is_err());
    }

    #[test]
    fn test_new_report_requires_fields() {
        let mut report = NewReport {
            title: "Pothole".to_string(),
            description: "Deep".to_string(),
            category: "Road".to_string(),
            ..NewReport::default()
        };
        assert!(report.validate().is_ok());

        report.category = "  ".to_string();
        assert!(matches!(report.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_update_deserializes_camel_case() {
        let update: ReportUpdate =
            serde_json::from_value(json!({"title": "New", "images": ["/uploads/a.jpg"]})).unwrap();
        assert_eq!(update.title.as_deref(), Some("New"));
        assert_eq!(update.images.unwrap().len(), 1);
        assert!(update.status.is_none());
        assert!(update.address.is_none());
    }

    #[test]
    fn test_update_null_differs_from_absent() {
        let update: ReportUpdate =
            serde_json::from_value(json!({"address": null, "latitude": 12.5})).unwrap();
        assert_eq!(update.address, Some(None));
        assert_eq!(update.latitude, Some(Some(12.5)));
        assert_eq!(update.longitude, None);
    }
}
