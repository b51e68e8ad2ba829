//! Report endpoints

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use infrafix_common::db::Comment;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::db::reports::{ReportDetail, ReportView};
use crate::error::{ApiError, ApiResult};
use crate::services::identity::Caller;
use crate::services::lifecycle::{NewReport, ReportQuery, ReportUpdate};
use crate::uploads::{discard_uploads, store_upload};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CommentRequest {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

/// File part of a multipart submission
struct PendingUpload {
    file_name: Option<String>,
    bytes: Bytes,
}

/// Empty coordinates are absent; anything else must parse
fn parse_coordinate(field: &str, raw: &str) -> ApiResult<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ApiError::Validation(format!("Invalid {}: {}", field, raw)))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {}", e))
}

/// GET /api/reports
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<Vec<ReportView>>> {
    Ok(Json(state.reports.list(query).await?))
}

/// GET /api/reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReportDetail>> {
    Ok(Json(state.reports.get(&caller, id).await?))
}

/// POST /api/reports (multipart)
///
/// Text fields are validated before any file touches the disk; files of a
/// submission that fails to persist are removed again.
pub async fn create_report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> ApiResult<Json<ReportView>> {
    let mut report = NewReport::default();
    let mut pending = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" | "images[]" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    pending.push(PendingUpload { file_name, bytes });
                }
            }
            "title" => report.title = field.text().await.map_err(multipart_error)?,
            "description" => report.description = field.text().await.map_err(multipart_error)?,
            "category" => report.category = field.text().await.map_err(multipart_error)?,
            "address" => {
                let address = field.text().await.map_err(multipart_error)?;
                report.address = Some(address).filter(|a| !a.trim().is_empty());
            }
            "latitude" => {
                let raw = field.text().await.map_err(multipart_error)?;
                report.latitude = parse_coordinate("latitude", &raw)?;
            }
            "longitude" => {
                let raw = field.text().await.map_err(multipart_error)?;
                report.longitude = parse_coordinate("longitude", &raw)?;
            }
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    report.validate()?;

    let mut stored = Vec::with_capacity(pending.len());
    for upload in &pending {
        match store_upload(&state.upload_dir, upload.file_name.as_deref(), &upload.bytes).await {
            Ok(s) => stored.push(s),
            Err(e) => {
                discard_uploads(&stored).await;
                return Err(e.into());
            }
        }
    }

    match state.reports.create(&caller, report, &stored).await {
        Ok(view) => Ok(Json(view)),
        Err(e) => {
            discard_uploads(&stored).await;
            Err(e)
        }
    }
}

/// PUT /api/reports/:id
pub async fn update_report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(update): Json<ReportUpdate>,
) -> ApiResult<Json<ReportView>> {
    Ok(Json(state.reports.update(&caller, id, update).await?))
}

/// DELETE /api/reports/:id
pub async fn delete_report(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.reports.delete(&caller, id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/reports/:id/comment
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .reports
        .add_comment(&caller, id, request.text.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /api/reports/:id/upvote
pub async fn toggle_upvote(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ReportDetail>> {
    Ok(Json(state.reports.toggle_upvote(&caller, id).await?))
}

/// POST /api/reports/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<ReportView>> {
    Ok(Json(
        state
            .reports
            .set_status(&caller, id, request.status.as_deref())
            .await?,
    ))
}
