//! Byte-range delivery of stored objects.
//!
//! Serves manifests, segments and thumbnails straight from the object store
//! with single-range `Range` support. Multi-range requests are refused with
//! `416`. Reading an asset's manifest counts as a view.

mod range;

pub use range::{parse_range, ByteRange, RangeError};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use cliphost_common::ObjectKey;
use std::io::SeekFrom;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::catalog::AssetCatalog;
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error(transparent)]
    Storage(StorageError),
}

impl StreamError {
    pub fn http_status(&self) -> u16 {
        match self {
            StreamError::NotFound(_) => 404,
            StreamError::Range(RangeError::Malformed(_)) => 400,
            StreamError::Range(RangeError::NotSatisfiable { .. }) => 416,
            StreamError::MultipleRanges => 416,
            StreamError::Storage(StorageError::NotFound(_)) => 404,
            StreamError::Storage(_) => 500,
        }
    }
}

impl From<StorageError> for StreamError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(key) => StreamError::NotFound(key),
            other => StreamError::Storage(other),
        }
    }
}

/// Serves stored objects over HTTP range semantics.
#[derive(Clone)]
pub struct StreamServer {
    store: ObjectStore,
    catalog: Arc<dyn AssetCatalog>,
}

impl StreamServer {
    pub fn new(store: ObjectStore, catalog: Arc<dyn AssetCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Build the response for `key`.
    ///
    /// `count_views` enables the manifest view counter; internal readers
    /// such as the encoder pass `false`.
    pub async fn serve(
        &self,
        key: &ObjectKey,
        range: Option<&str>,
        count_views: bool,
    ) -> Result<Response, StreamError> {
        let object = self.store.get(key).await?;
        let size = object.stat.size;

        if count_views && key.is_manifest() {
            if let Err(e) = self.catalog.increment_views(key.asset()).await {
                tracing::warn!(asset_id = %key.asset(), error = %e, "Failed to count view");
            }
        }

        let ranges = parse_range(range.unwrap_or_default().trim(), size)?;
        if ranges.len() > 1 {
            return Err(StreamError::MultipleRanges);
        }

        let builder = Response::builder()
            .header(header::CONTENT_TYPE, content_type(key.name()))
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::ETAG, format!("\"{}\"", object.stat.etag));

        let response = match ranges.first() {
            Some(range) => {
                let mut reader = object.reader;
                reader
                    .seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(StorageError::from)?;

                builder
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, range.content_range(size))
                    .header(header::CONTENT_LENGTH, range.length)
                    .body(Body::from_stream(ReaderStream::new(reader.take(range.length))))
            }
            None => builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, size)
                .body(Body::from_stream(ReaderStream::new(object.reader))),
        };

        response.map_err(|e| {
            StreamError::Storage(StorageError::Backend(std::io::Error::other(e)))
        })
    }
}

/// Content type from the object name's extension.
fn content_type(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match extension.to_ascii_lowercase().as_str() {
        "mpd" => "application/dash+xml",
        "m4s" => "video/iso.segment",
        "mp4" | "m4v" => "video/mp4",
        "m4a" => "audio/mp4",
        "webm" => "video/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("manifest.mpd"), "application/dash+xml");
        assert_eq!(content_type("chunk-stream0-00001.m4s"), "video/iso.segment");
        assert_eq!(content_type("thumbnail.jpg"), "image/jpeg");
        assert_eq!(content_type("raw"), "application/octet-stream");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(StreamError::NotFound("k".into()).http_status(), 404);
        assert_eq!(
            StreamError::Range(RangeError::Malformed("x".into())).http_status(),
            400
        );
        assert_eq!(StreamError::MultipleRanges.http_status(), 416);
        assert_eq!(
            StreamError::from(StorageError::NotFound("k".into())).http_status(),
            404
        );
    }
}
