//! One asset's transcode run.

use cliphost_av::{select_ladder, QualityTable};
use cliphost_common::{AssetId, ObjectKey};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::{EncodeError, EncodeRequest, Encoder, SourceProber};
use crate::catalog::{AssetCatalog, CatalogError};
use crate::progress::ProgressRegistry;
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("thumbnail extraction failed: {0}")]
    Thumbnail(#[source] EncodeError),

    #[error("probe failed: {0}")]
    Probe(#[from] cliphost_av::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("job was cancelled")]
    Cancelled,
}

/// Services a job runs against.
#[derive(Clone)]
pub struct JobContext {
    pub store: ObjectStore,
    pub progress: ProgressRegistry,
    pub catalog: Arc<dyn AssetCatalog>,
    pub prober: Arc<dyn SourceProber>,
    pub encoder: Arc<dyn Encoder>,
    pub quality: Arc<QualityTable>,
    /// How long a failed job stays visible to progress pollers.
    pub failure_grace: Duration,
}

/// Run the transcode steps for `asset`.
pub(super) async fn run(ctx: &JobContext, asset: AssetId) -> Result<(), JobError> {
    ctx.encoder
        .thumbnail(asset)
        .await
        .map_err(JobError::Thumbnail)?;

    let source = ctx.prober.probe(asset).await?;
    let ladder = select_ladder(source.width, source.height, source.fps, &ctx.quality);

    let max_frames = source.frame_count_at(ladder.primary_framerate());
    ctx.progress.set_max(asset, max_frames);

    tracing::info!(
        asset_id = %asset,
        width = source.width,
        height = source.height,
        fps = source.fps,
        rungs = ladder.rungs().len(),
        max_frames,
        "Encoding"
    );

    let request = EncodeRequest {
        asset,
        source,
        ladder,
    };
    ctx.encoder.encode(&request, &ctx.progress).await?;

    publish(ctx, asset).await;
    Ok(())
}

/// Make a finished encode visible.
async fn publish(ctx: &JobContext, asset: AssetId) {
    if let Err(e) = ctx.store.delete(&ObjectKey::raw(asset)).await {
        tracing::warn!(asset_id = %asset, error = %e, "Failed to delete raw source");
    }

    ctx.store.wait_for_uploads(asset).await;

    if let Err(e) = ctx.catalog.set_processing(asset, false).await {
        tracing::error!(asset_id = %asset, error = %e, "Failed to clear processing flag");
    }

    ctx.progress.remove(asset);
}

/// Terminal failure: surface it to pollers and remove the asset.
pub(super) async fn fail(ctx: &JobContext, asset: AssetId, error: &JobError) {
    tracing::error!(asset_id = %asset, error = %error, "Transcode failed");
    ctx.progress.fail(asset);

    ctx.store.wait_for_uploads(asset).await;
    if let Err(e) = ctx.store.delete_by_prefix(asset).await {
        tracing::warn!(asset_id = %asset, error = %e, "Failed to delete asset objects");
    }
    if let Err(e) = ctx.catalog.delete_asset(asset).await {
        tracing::warn!(asset_id = %asset, error = %e, "Failed to delete asset record");
    }

    ctx.progress.schedule_purge(asset, ctx.failure_grace);
}
