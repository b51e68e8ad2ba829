//! Contractor bid endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use infrafix_common::db::Bid;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::services::identity::Caller;
use crate::services::lifecycle::PlaceBid;
use crate::AppState;

/// POST /api/reports/:id/bids
pub async fn place_bid(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(bid): Json<PlaceBid>,
) -> ApiResult<(StatusCode, Json<Bid>)> {
    let bid = state.reports.place_bid(&caller, id, bid).await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// GET /api/reports/:id/bids
pub async fn list_bids(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Vec<Bid>>> {
    Ok(Json(state.reports.list_bids(id).await?))
}

/// DELETE /api/reports/bids/:bid_id
pub async fn delete_bid(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(bid_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.reports.delete_bid(&caller, bid_id).await?;
    Ok(Json(json!({ "ok": true })))
}
