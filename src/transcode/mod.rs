//! Asynchronous transcode pipeline.
//!
//! A job takes an uploaded `raw` source through thumbnail extraction, probing,
//! ladder selection and the DASH encode, then publishes the result by
//! deleting the source and clearing the asset's processing flag. The external
//! tools sit behind [`SourceProber`] and [`Encoder`] so the pipeline can run
//! against fakes.

mod encoder;
mod job;
mod pool;
mod recovery;

pub use encoder::{FfmpegEncoder, FfprobeProber, ObjectUrls};
pub use job::{JobContext, JobError};
pub use pool::{SubmitError, TranscodeWorkerPool};
pub use recovery::recover_assets;

use async_trait::async_trait;
use cliphost_av::{Ladder, SourceInfo};
use cliphost_common::AssetId;
use std::io;
use thiserror::Error;

use crate::progress::ProgressRegistry;

/// Everything the encoder needs for one asset.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub asset: AssetId,
    pub source: SourceInfo,
    pub ladder: Ladder,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{tool} exited with {status}: {stderr}")]
    ProcessFailed {
        tool: &'static str,
        status: String,
        /// Last lines of the tool's diagnostic output.
        stderr: String,
    },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("encoder I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Inspects an asset's uploaded source.
#[async_trait]
pub trait SourceProber: Send + Sync + 'static {
    async fn probe(&self, asset: AssetId) -> cliphost_av::Result<SourceInfo>;
}

/// Runs the external encoder for an asset.
#[async_trait]
pub trait Encoder: Send + Sync + 'static {
    /// Write the asset's thumbnail from its raw source.
    async fn thumbnail(&self, asset: AssetId) -> Result<(), EncodeError>;

    /// Produce the manifest and segments, reporting frames into `progress`.
    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressRegistry,
    ) -> Result<(), EncodeError>;
}
