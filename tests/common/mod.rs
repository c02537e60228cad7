//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a full [`AppContext`] over an in-memory blob
//! backend and an in-memory SQLite catalog, with fake probe and encode tools
//! standing in for ffprobe and ffmpeg.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;

use cliphost::catalog::{AssetCatalog, SqliteCatalog};
use cliphost::config::Config;
use cliphost::progress::ProgressRegistry;
use cliphost::server::{create_internal_router, create_public_router, AppContext, Services};
use cliphost::storage::{BlobBackend, MemoryBackend};
use cliphost::transcode::{EncodeError, EncodeRequest, Encoder, SourceProber};
use cliphost_av::SourceInfo;
use cliphost_common::{AssetId, ObjectKey};
use cliphost_db::pool::{init_memory_pool, DbPool};

/// How the fake encoder behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    Succeed,
    Fail,
    Panic,
}

/// Prober returning a fixed 1080p, 30 fps, ten second source.
pub struct FakeProber {
    pub info: SourceInfo,
}

impl Default for FakeProber {
    fn default() -> Self {
        Self {
            info: SourceInfo {
                width: 1920,
                height: 1080,
                fps: 30,
                duration: Duration::from_secs(10),
                audio_tracks: 1,
                rotation: 0,
            },
        }
    }
}

#[async_trait]
impl SourceProber for FakeProber {
    async fn probe(&self, _asset: AssetId) -> cliphost_av::Result<SourceInfo> {
        Ok(self.info.clone())
    }
}

/// Encoder writing a placeholder package straight into the backend.
pub struct FakeEncoder {
    backend: MemoryBackend,
    mode: EncodeMode,
    delay: Duration,
    pub encodes: AtomicUsize,
}

impl FakeEncoder {
    pub fn new(backend: MemoryBackend, mode: EncodeMode) -> Self {
        Self {
            backend,
            mode,
            delay: Duration::ZERO,
            encodes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn write(&self, key: ObjectKey, data: &'static [u8]) -> Result<(), EncodeError> {
        self.backend
            .put(&key.to_string(), Bytes::from_static(data))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn thumbnail(&self, asset: AssetId) -> Result<(), EncodeError> {
        self.write(ObjectKey::thumbnail(asset), b"jpeg").await
    }

    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressRegistry,
    ) -> Result<(), EncodeError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        let asset = request.asset;

        progress.report(asset, 150);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.mode {
            EncodeMode::Succeed => {
                let segment = ObjectKey::new(asset, "chunk-stream0-00001.m4s")
                    .expect("valid segment name");
                self.write(segment, b"segment").await?;
                self.write(ObjectKey::manifest(asset), b"<MPD/>").await?;
                progress.report(asset, 300);
                Ok(())
            }
            EncodeMode::Fail => Err(EncodeError::ProcessFailed {
                tool: "ffmpeg",
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            }),
            EncodeMode::Panic => panic!("encoder blew up"),
        }
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub backend: MemoryBackend,
    pub db: DbPool,
    pub encoder: Arc<FakeEncoder>,
}

impl TestHarness {
    /// Default configuration with an encoder that succeeds.
    pub fn new() -> Self {
        Self::with_mode(EncodeMode::Succeed)
    }

    pub fn with_mode(mode: EncodeMode) -> Self {
        let backend = MemoryBackend::new();
        Self::build(Config::default(), FakeEncoder::new(backend.clone(), mode), backend)
    }

    pub fn with_config(config: Config) -> Self {
        let backend = MemoryBackend::new();
        let encoder = FakeEncoder::new(backend.clone(), EncodeMode::Succeed);
        Self::build(config, encoder, backend)
    }

    pub fn build(config: Config, encoder: FakeEncoder, backend: MemoryBackend) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let encoder = Arc::new(encoder);

        let services = Services {
            backend: Arc::new(backend.clone()),
            catalog: Arc::new(SqliteCatalog::new(db.clone())),
            prober: Arc::new(FakeProber::default()),
            encoder: encoder.clone(),
        };
        let ctx = AppContext::new(config, services).expect("failed to build context");

        Self {
            ctx,
            backend,
            db,
            encoder,
        }
    }

    pub fn internal(&self) -> Router {
        create_internal_router(self.ctx.clone())
    }

    pub fn public(&self) -> Router {
        create_public_router(self.ctx.clone())
    }

    pub fn catalog(&self) -> &dyn AssetCatalog {
        self.ctx.catalog.as_ref()
    }

    /// Store `data` under `key` through the chunked upload path.
    pub async fn put(&self, key: &ObjectKey, data: &[u8]) {
        self.ctx
            .store
            .put_chunked(key, data)
            .await
            .expect("upload failed");
    }

    /// Upload a raw source and flag the asset as processing.
    pub async fn seed_raw(&self) -> AssetId {
        let asset = AssetId::new();
        self.put(&ObjectKey::raw(asset), b"raw source bytes").await;
        self.catalog()
            .mark_processing(asset)
            .await
            .expect("mark_processing failed");
        asset
    }

    pub fn asset_row(&self, asset: AssetId) -> Option<cliphost_db::Asset> {
        let conn = cliphost_db::pool::get_conn(&self.db).expect("failed to get db connection");
        cliphost_db::queries::assets::find_asset(&conn, asset).expect("query failed")
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Helper to get response body as bytes
pub async fn body_bytes(body: Body) -> Bytes {
    body.collect().await.unwrap().to_bytes()
}

/// Helper to get response body as string
pub async fn body_to_string(body: Body) -> String {
    String::from_utf8(body_bytes(body).await.to_vec()).unwrap()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}
