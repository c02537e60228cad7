//! # cliphost-av
//!
//! External media tooling for the cliphost transcode pipeline.
//!
//! This crate provides functionality for:
//! - Probing an uploaded source (dimensions, frame rate, duration, audio
//!   tracks) with rotation correction
//! - Selecting an adaptive-bitrate quality ladder for a source
//! - Building the ffmpeg argument vectors for thumbnail extraction and the
//!   DASH transcode
//!
//! ## Features
//!
//! - `async` - Async subprocess execution of ffprobe
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```
//! use cliphost_av::{select_ladder, QualityTable};
//!
//! let table = QualityTable::parse(&["640x360-30@1", "1280x720-30@5"])?;
//! let ladder = select_ladder(1920, 1080, 30, &table);
//! assert_eq!(ladder.rungs().len(), 2);
//! # Ok::<(), cliphost_av::LadderError>(())
//! ```

pub mod encode;
mod error;
pub mod ladder;
pub mod probe;
pub mod tools;

// Re-exports
pub use encode::{
    build_thumbnail_args, build_transcode_args, EncodeSettings, TranscodeTargets,
};
pub use error::{Error, Result};
pub use ladder::{select_ladder, AspectRatio, Ladder, LadderError, QualityPreset, QualityTable, Rung};
pub use probe::{parse_probe_output, parse_sexagesimal, SourceInfo};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};

#[cfg(feature = "async")]
pub use probe::probe_source;
