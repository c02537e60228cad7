use cliphost_av::{EncodeSettings, LadderError, QualityPreset, QualityTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::size::ByteSize;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Public listener (streaming and progress polling).
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Loopback listener for object writes and progress pushes from the
    /// encoder. Never expose this one.
    #[serde(default = "default_internal_host")]
    pub internal_host: String,

    #[serde(default = "default_internal_port")]
    pub internal_port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_internal_host() -> String {
    "127.0.0.1".to_string()
}

fn default_internal_port() -> u16 {
    12786
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            internal_host: default_internal_host(),
            internal_port: default_internal_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the object tree.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Part size used by chunked uploads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,

    /// Largest accepted upload, e.g. `"5 GB"`.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: ByteSize,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_chunk_size() -> ByteSize {
    ByteSize(16 * 1024 * 1024)
}

fn default_max_upload_size() -> ByteSize {
    ByteSize(5_000_000_000)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            chunk_size: default_chunk_size(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Number of encoder processes allowed to run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Explicit ffmpeg binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Encoder threads (0 = ffmpeg default).
    #[serde(default)]
    pub threads: u32,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_tune")]
    pub tune: String,

    /// Quality table as `WxH-FPS@MBPS` entries.
    #[serde(default = "default_quality_presets")]
    pub quality_presets: Vec<QualityPreset>,

    /// How long a failed job's progress entry stays visible.
    #[serde(default = "default_failure_grace_secs")]
    pub failure_grace_secs: u64,
}

fn default_concurrency() -> usize {
    1
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_tune() -> String {
    "film".to_string()
}

fn default_failure_grace_secs() -> u64 {
    30
}

const DEFAULT_QUALITY_PRESETS: &[&str] = &[
    "640x360-30@1",
    "854x480-30@2.5",
    "1280x720-30@5",
    "1920x1080-30@8",
    "1920x1080-60@12",
    "2560x1440-30@16",
    "2560x1440-60@24",
    "3840x2160-30@45",
    "3840x2160-60@68",
    "7680x4320-30@160",
    "7680x4320-60@240",
];

fn default_quality_presets() -> Vec<QualityPreset> {
    DEFAULT_QUALITY_PRESETS
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ffmpeg_path: None,
            ffprobe_path: None,
            threads: 0,
            preset: default_preset(),
            tune: default_tune(),
            quality_presets: default_quality_presets(),
            failure_grace_secs: default_failure_grace_secs(),
        }
    }
}

impl TranscodeConfig {
    /// Validated, bitrate-sorted quality table.
    pub fn quality_table(&self) -> Result<QualityTable, LadderError> {
        QualityTable::new(self.quality_presets.clone())
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            preset: self.preset.clone(),
            tune: self.tune.clone(),
            threads: self.threads,
        }
    }

    pub fn failure_grace(&self) -> Duration {
        Duration::from_secs(self.failure_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/cliphost.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}
