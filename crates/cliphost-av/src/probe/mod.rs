//! Source probing.
//!
//! Runs ffprobe against an uploaded source and reduces its JSON output to the
//! handful of values the ladder selection and the encoder need. Dimensions are
//! reported in *displayed* orientation: a 90/270 degree rotation in the stream
//! side data swaps width and height.

mod ffprobe;

pub use ffprobe::{parse_probe_output, parse_sexagesimal, probe_args};

use serde::Serialize;
use std::time::Duration;

/// What the pipeline needs to know about an uploaded source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Displayed width in pixels (rotation-corrected).
    pub width: u32,
    /// Displayed height in pixels (rotation-corrected).
    pub height: u32,
    /// Frame rate rounded to whole frames per second.
    pub fps: u32,
    /// Container duration.
    pub duration: Duration,
    /// Number of audio tracks.
    pub audio_tracks: u32,
    /// Rotation recorded in the video stream's side data, in degrees.
    pub rotation: i32,
}

impl SourceInfo {
    /// Whether the displayed picture is taller than it is wide.
    pub fn is_vertical(&self) -> bool {
        self.height > self.width
    }

    /// Approximate frame count at `fps` over the source duration.
    pub fn frame_count_at(&self, fps: u32) -> u64 {
        self.duration.as_secs() * u64::from(fps)
    }
}

/// Probe a source with ffprobe.
///
/// `input` may be a local path or a URL the ffprobe binary can open.
///
/// # Errors
///
/// - [`crate::Error::ToolNotFound`] if the binary cannot be spawned
/// - [`crate::Error::ToolFailed`] if ffprobe exits non-zero
/// - [`crate::Error::NoVideoStream`] if the source has no video track
/// - [`crate::Error::ParseError`] on malformed output
#[cfg(feature = "async")]
pub async fn probe_source(ffprobe: &std::path::Path, input: &str) -> crate::Result<SourceInfo> {
    use crate::Error;

    let output = tokio::process::Command::new(ffprobe)
        .args(probe_args(input))
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.trim().to_string()));
    }

    let info = parse_probe_output(&output.stdout)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        input,
        width = info.width,
        height = info.height,
        fps = info.fps,
        audio_tracks = info.audio_tracks,
        "Probed source"
    );

    Ok(info)
}
