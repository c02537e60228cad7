//! HTTP surfaces and service wiring.
//!
//! Two listeners share one [`AppContext`]: the public router (clip delivery,
//! progress polling, health) and the internal router bound to loopback, which
//! the encoder uses to read sources and write its output.

use anyhow::{Context, Result};
use axum::Router;
use chrono::{DateTime, Utc};
use cliphost_av::require_tool;
use cliphost_db::pool::init_pool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::catalog::{AssetCatalog, SqliteCatalog};
use crate::config::Config;
use crate::progress::ProgressRegistry;
use crate::storage::{BlobBackend, FsBackend, ObjectStore, UploadLimits};
use crate::streaming::StreamServer;
use crate::transcode::{
    recover_assets, Encoder, FfmpegEncoder, FfprobeProber, JobContext, ObjectUrls, SourceProber,
    TranscodeWorkerPool,
};

pub mod error;
pub mod routes_internal;
pub mod routes_public;

pub use error::ApiError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: ObjectStore,
    pub progress: ProgressRegistry,
    pub catalog: Arc<dyn AssetCatalog>,
    pub pool: TranscodeWorkerPool,
    pub streams: StreamServer,
    pub started_at: DateTime<Utc>,
}

/// External collaborators an [`AppContext`] is assembled from.
pub struct Services {
    pub backend: Arc<dyn BlobBackend>,
    pub catalog: Arc<dyn AssetCatalog>,
    pub prober: Arc<dyn SourceProber>,
    pub encoder: Arc<dyn Encoder>,
}

impl AppContext {
    /// Wire the pipeline together. Fails on an invalid quality table.
    pub fn new(config: Config, services: Services) -> Result<Self> {
        let quality = config
            .transcode
            .quality_table()
            .context("Invalid transcode.quality_presets")?;

        let store = ObjectStore::new(
            services.backend,
            UploadLimits {
                chunk_size: usize::try_from(config.storage.chunk_size.as_u64())
                    .context("storage.chunk_size does not fit in memory")?,
                max_upload_size: config.storage.max_upload_size.as_u64(),
            },
        );
        let progress = ProgressRegistry::new();

        let pool = TranscodeWorkerPool::new(
            JobContext {
                store: store.clone(),
                progress: progress.clone(),
                catalog: services.catalog.clone(),
                prober: services.prober,
                encoder: services.encoder,
                quality: Arc::new(quality),
                failure_grace: config.transcode.failure_grace(),
            },
            config.transcode.concurrency,
        );

        Ok(Self {
            streams: StreamServer::new(store.clone(), services.catalog.clone()),
            config: Arc::new(config),
            store,
            progress,
            catalog: services.catalog,
            pool,
            started_at: Utc::now(),
        })
    }

    /// Production wiring: filesystem objects, SQLite catalog, ffmpeg tools.
    pub async fn from_config(config: Config) -> Result<Self> {
        let backend = FsBackend::open(&config.storage.root)
            .await
            .with_context(|| format!("Failed to open object root {:?}", config.storage.root))?;

        if let Some(parent) = config.database.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
        let db_path = config.database.path.to_string_lossy().into_owned();
        tracing::info!("Initializing database at {}", db_path);
        let db_pool = init_pool(&db_path)?;

        let ffmpeg = require_tool("ffmpeg", config.transcode.ffmpeg_path.as_deref())?;
        let ffprobe = require_tool("ffprobe", config.transcode.ffprobe_path.as_deref())?;
        let urls = ObjectUrls::new(&config.server.internal_host, config.server.internal_port);

        let services = Services {
            backend: Arc::new(backend),
            catalog: Arc::new(SqliteCatalog::new(db_pool)),
            prober: Arc::new(FfprobeProber::new(ffprobe, urls.clone())),
            encoder: Arc::new(FfmpegEncoder::new(
                ffmpeg,
                config.transcode.encode_settings(),
                urls,
            )),
        };

        Self::new(config, services)
    }
}

/// Router for the loopback listener.
pub fn create_internal_router(ctx: AppContext) -> Router {
    routes_internal::internal_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Router for the public listener.
pub fn create_public_router(ctx: AppContext) -> Router {
    routes_public::public_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind both listeners, re-drive interrupted jobs, then serve until a
/// shutdown signal arrives.
///
/// Listeners are bound before recovery so recovered encoders can reach the
/// internal endpoint; connections queue until serving starts.
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let server = &ctx.config.server;
    let public_addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .context("Invalid server address")?;
    let internal_addr: SocketAddr = format!("{}:{}", server.internal_host, server.internal_port)
        .parse()
        .context("Invalid internal server address")?;

    let internal_listener = tokio::net::TcpListener::bind(internal_addr)
        .await
        .with_context(|| format!("Failed to bind internal listener on {internal_addr}"))?;
    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .with_context(|| format!("Failed to bind public listener on {public_addr}"))?;

    let recovered = recover_assets(ctx.catalog.as_ref(), &ctx.pool)
        .await
        .context("Failed to recover interrupted transcodes")?;
    if recovered > 0 {
        tracing::info!("Re-submitted {} interrupted transcodes", recovered);
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    tracing::info!("Internal server listening on {}", internal_addr);
    tracing::info!("Public server listening on {}", public_addr);

    let internal = axum::serve(internal_listener, create_internal_router(ctx.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let public = axum::serve(public_listener, create_public_router(ctx.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    tokio::try_join!(
        async { internal.await.context("Internal server failed") },
        async { public.await.context("Public server failed") },
    )?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
