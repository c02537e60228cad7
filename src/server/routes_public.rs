//! Public routes: health, clip delivery and progress polling.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use super::error::ApiError;
use super::routes_internal::{parse_asset, parse_key, range_header};
use super::AppContext;

pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/api/clips/:asset/:file", get(stream_clip))
        .route("/api/progress/:asset", get(get_progress))
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let uptime = Utc::now().signed_duration_since(ctx.started_at);
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds(),
        "active_jobs": ctx.pool.active_count(),
        "worker_slots": ctx.pool.concurrency(),
    }))
}

async fn stream_clip(
    State(ctx): State<AppContext>,
    Path((asset, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = parse_key(&asset, &file)?;
    let range = range_header(&headers)?;

    Ok(ctx.streams.serve(&key, range, true).await?)
}

async fn get_progress(
    State(ctx): State<AppContext>,
    Path(asset): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let asset = parse_asset(&asset)?;
    let progress = ctx
        .progress
        .get(asset)
        .ok_or_else(|| ApiError::NotFound(format!("no transcode for asset {asset}")))?;

    Ok(Json(json!({ "progress": progress })))
}
