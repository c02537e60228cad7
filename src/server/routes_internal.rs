//! Loopback-only routes used by the encoder subprocess and upload front-ends.
//!
//! - `PUT|POST /objects/:asset/:file` - chunked object upload
//! - `GET /objects/:asset/:file` - range-aware read, no view counting
//! - `DELETE /objects/:asset/:file`
//! - `POST /progress/:asset` - ffmpeg `-progress` lines
//! - `POST /assets/:asset/transcode` - flag and queue a transcode

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cliphost_common::{AssetId, ObjectKey};
use futures::TryStreamExt;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;

use super::error::ApiError;
use super::AppContext;
use crate::progress::{KeyValueProgress, ProgressSink};
use crate::storage::StorageError;
use crate::streaming::{RangeError, StreamError};

pub fn internal_routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/objects/:asset/:file",
            get(read_object)
                .put(upload_object)
                .post(upload_object)
                .delete(delete_object),
        )
        .route("/progress/:asset", post(report_progress))
        .route("/assets/:asset/transcode", post(submit_transcode))
        .layer(DefaultBodyLimit::disable())
}

pub(super) fn parse_asset(raw: &str) -> Result<AssetId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid asset id '{raw}'")))
}

pub(super) fn parse_key(asset: &str, file: &str) -> Result<ObjectKey, ApiError> {
    let asset = parse_asset(asset)?;
    ObjectKey::new(asset, file).ok_or_else(|| StorageError::InvalidKey(file.to_string()).into())
}

/// The raw `Range` header, if any. Non-visible-ASCII values are malformed.
pub(super) fn range_header(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    headers
        .get(header::RANGE)
        .map(|value| {
            value.to_str().map_err(|_| {
                let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
                StreamError::from(RangeError::Malformed(raw)).into()
            })
        })
        .transpose()
}

fn body_reader(body: Body) -> impl AsyncBufRead + Unpin + Send {
    StreamReader::new(body.into_data_stream().map_err(std::io::Error::other))
}

async fn upload_object(
    State(ctx): State<AppContext>,
    Path((asset, file)): Path<(String, String)>,
    body: Body,
) -> Result<Response, ApiError> {
    let key = parse_key(&asset, &file)?;
    let size = ctx.store.put_chunked(&key, body_reader(body)).await?;

    Ok((StatusCode::CREATED, Json(json!({ "size": size }))).into_response())
}

async fn read_object(
    State(ctx): State<AppContext>,
    Path((asset, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = parse_key(&asset, &file)?;
    let range = range_header(&headers)?;

    Ok(ctx.streams.serve(&key, range, false).await?)
}

async fn delete_object(
    State(ctx): State<AppContext>,
    Path((asset, file)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = parse_key(&asset, &file)?;
    ctx.store.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Consume a (possibly long-lived) stream of progress lines.
async fn report_progress(
    State(ctx): State<AppContext>,
    Path(asset): Path<String>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let asset = parse_asset(&asset)?;
    let mut lines = body_reader(body).lines();
    let mut sink = KeyValueProgress::new();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match sink.consume(&line) {
            Ok(Some(update)) => ctx.progress.apply(asset, update),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(asset_id = %asset, line = %line, "Malformed progress line");
                return Err(e.into());
            }
        }
    }

    Ok(StatusCode::OK)
}

async fn submit_transcode(
    State(ctx): State<AppContext>,
    Path(asset): Path<String>,
) -> Result<Response, ApiError> {
    let asset = parse_asset(&asset)?;

    if ctx.pool.is_active(asset) {
        return Err(crate::transcode::SubmitError::AlreadyActive(asset).into());
    }
    if !ctx.store.exists(&ObjectKey::raw(asset)).await? {
        return Err(ApiError::NotFound(format!("no raw upload for asset {asset}")));
    }

    ctx.catalog.mark_processing(asset).await?;
    ctx.pool.submit(asset)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "asset": asset, "progress": crate::progress::QUEUED })),
    )
        .into_response())
}
