//! Startup recovery of interrupted jobs.

use crate::catalog::{AssetCatalog, CatalogError};

use super::pool::{SubmitError, TranscodeWorkerPool};

/// Re-submit every asset still flagged as processing.
///
/// Runs once at startup, before the listeners accept traffic. A crash leaves
/// the flag set, so those jobs start over from the raw source. Returns the
/// number of jobs submitted.
pub async fn recover_assets(
    catalog: &dyn AssetCatalog,
    pool: &TranscodeWorkerPool,
) -> Result<usize, CatalogError> {
    let assets = catalog.list_processing().await?;
    if assets.is_empty() {
        return Ok(0);
    }

    tracing::info!(count = assets.len(), "Recovering interrupted transcodes");

    let mut submitted = 0;
    for asset in assets {
        match pool.submit(asset) {
            Ok(()) => submitted += 1,
            Err(SubmitError::AlreadyActive(_)) => {
                tracing::debug!(asset_id = %asset, "Already queued, skipping");
            }
        }
    }

    Ok(submitted)
}
