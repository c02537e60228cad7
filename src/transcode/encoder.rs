//! ffmpeg and ffprobe adapters.
//!
//! Both tools read the raw source from, and write their outputs to, the
//! internal object endpoint, so every byte they produce goes through the
//! object store's chunked upload path.

use async_trait::async_trait;
use cliphost_av::{
    build_thumbnail_args, build_transcode_args, probe_source, EncodeSettings, SourceInfo,
    TranscodeTargets,
};
use cliphost_common::{AssetId, ObjectKey};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::{EncodeError, EncodeRequest, Encoder, SourceProber};
use crate::progress::{KeyValueProgress, ProgressRegistry, ProgressSink};

/// Diagnostic lines kept from a failed run.
const STDERR_TAIL_LINES: usize = 20;

/// Builds object URLs on the internal listener.
#[derive(Debug, Clone)]
pub struct ObjectUrls {
    base: String,
}

impl ObjectUrls {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: format!("http://{host}:{port}/objects"),
        }
    }

    pub fn url(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.base, key)
    }
}

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
    urls: ObjectUrls,
}

impl FfprobeProber {
    pub fn new(ffprobe: PathBuf, urls: ObjectUrls) -> Self {
        Self { ffprobe, urls }
    }
}

#[async_trait]
impl SourceProber for FfprobeProber {
    async fn probe(&self, asset: AssetId) -> cliphost_av::Result<SourceInfo> {
        probe_source(&self.ffprobe, &self.urls.url(&ObjectKey::raw(asset))).await
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    settings: EncodeSettings,
    urls: ObjectUrls,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: PathBuf, settings: EncodeSettings, urls: ObjectUrls) -> Self {
        Self {
            ffmpeg,
            settings,
            urls,
        }
    }

    async fn run(
        &self,
        args: Vec<String>,
        progress: Option<(AssetId, &ProgressRegistry)>,
    ) -> Result<(), EncodeError> {
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(if progress.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                tool: "ffmpeg",
                source,
            })?;

        let stderr_tail = child.stderr.take().map(|stderr| tokio::spawn(tail_lines(stderr)));

        if let (Some(stdout), Some((asset, registry))) = (child.stdout.take(), progress) {
            let mut lines = BufReader::new(stdout).lines();
            let mut sink = KeyValueProgress::new();
            while let Some(line) = lines.next_line().await? {
                match sink.consume(&line) {
                    Ok(Some(update)) => registry.apply(asset, update),
                    Ok(None) => {}
                    Err(e) => tracing::debug!(asset_id = %asset, error = %e, "Skipping progress line"),
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_tail {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(EncodeError::ProcessFailed {
                tool: "ffmpeg",
                status: status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn thumbnail(&self, asset: AssetId) -> Result<(), EncodeError> {
        let args = build_thumbnail_args(
            &self.urls.url(&ObjectKey::raw(asset)),
            &self.urls.url(&ObjectKey::thumbnail(asset)),
        );
        self.run(args, None).await
    }

    async fn encode(
        &self,
        request: &EncodeRequest,
        progress: &ProgressRegistry,
    ) -> Result<(), EncodeError> {
        let targets = TranscodeTargets {
            input: self.urls.url(&ObjectKey::raw(request.asset)),
            progress: "pipe:1".to_string(),
            manifest: self.urls.url(&ObjectKey::manifest(request.asset)),
        };
        let args = build_transcode_args(&targets, &request.source, &request.ladder, &self.settings);
        self.run(args, Some((request.asset, progress))).await
    }
}

/// Read `reader` to the end, keeping only the last few lines.
async fn tail_lines<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}
