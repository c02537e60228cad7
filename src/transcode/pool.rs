//! Bounded worker pool for transcode jobs.

use cliphost_common::AssetId;
use dashmap::DashSet;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::job::{self, JobContext, JobError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a transcode job for asset {0} is already active")]
    AlreadyActive(AssetId),
}

struct PoolInner {
    ctx: JobContext,
    permits: Arc<Semaphore>,
    active: DashSet<AssetId>,
    tracker: TaskTracker,
    concurrency: usize,
}

/// Runs at most `concurrency` jobs at once, one per asset.
///
/// Cloning is cheap and shares the queue.
#[derive(Clone)]
pub struct TranscodeWorkerPool {
    inner: Arc<PoolInner>,
}

impl TranscodeWorkerPool {
    pub fn new(ctx: JobContext, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            inner: Arc::new(PoolInner {
                ctx,
                permits: Arc::new(Semaphore::new(concurrency)),
                active: DashSet::new(),
                tracker: TaskTracker::new(),
                concurrency,
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn context(&self) -> &JobContext {
        &self.inner.ctx
    }

    /// Whether `asset` has a queued or running job.
    pub fn is_active(&self, asset: AssetId) -> bool {
        self.inner.active.contains(&asset)
    }

    /// Number of queued plus running jobs.
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Queue a transcode for `asset`.
    ///
    /// Registers the job as queued in the progress registry before returning.
    /// Never waits for a worker slot. Must be called from within a Tokio
    /// runtime.
    pub fn submit(&self, asset: AssetId) -> Result<(), SubmitError> {
        if !self.inner.active.insert(asset) {
            return Err(SubmitError::AlreadyActive(asset));
        }
        self.inner.ctx.progress.start(asset);
        tracing::info!(asset_id = %asset, "Transcode queued");

        let inner = self.inner.clone();
        let span = tracing::info_span!("transcode", asset_id = %asset);
        self.inner
            .tracker
            .spawn(async move { inner.process(asset).await }.instrument(span));

        Ok(())
    }

    /// Wait until every submitted job has finished, including cleanup.
    pub async fn drain(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }
}

impl PoolInner {
    async fn process(&self, asset: AssetId) {
        let result = match self.permits.acquire().await {
            Ok(_permit) => {
                tracing::debug!("Transcode running");
                let ctx = self.ctx.clone();
                // Run on its own task so a panic surfaces as a JoinError.
                let task = async move { job::run(&ctx, asset).await }.in_current_span();
                match tokio::spawn(task).await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
                    Err(_) => Err(JobError::Cancelled),
                }
            }
            Err(_) => Err(JobError::Cancelled),
        };

        match result {
            Ok(()) => tracing::info!("Transcode succeeded"),
            Err(e) => job::fail(&self.ctx, asset, &e).await,
        }

        self.active.remove(&asset);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
