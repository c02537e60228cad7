//! Live transcode progress.
//!
//! One entry per asset with a queued or running job. Readers see either a
//! percentage in `0..=100` or one of the sentinels [`QUEUED`] and [`FAILED`].
//! Entries are sharded by asset id and updated with atomics, so a progress
//! push for one job never waits on a poll for another.

mod parser;

pub use parser::{KeyValueProgress, ProgressLineError, ProgressSink, ProgressUpdate};

use cliphost_common::AssetId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Job is queued or has not reported a frame yet.
pub const QUEUED: i64 = -1;

/// Job failed.
pub const FAILED: i64 = -2;

#[derive(Debug)]
struct ProgressEntry {
    max_frames: AtomicU64,
    current_frame: AtomicI64,
}

impl ProgressEntry {
    fn queued() -> Self {
        Self {
            max_frames: AtomicU64::new(0),
            current_frame: AtomicI64::new(QUEUED),
        }
    }

    fn percent(&self) -> i64 {
        let current = self.current_frame.load(Ordering::Acquire);
        if current < 0 {
            return current;
        }

        let max = self.max_frames.load(Ordering::Acquire);
        if max == 0 {
            return 0;
        }

        let percent = (current as f64 / max as f64 * 100.0).round() as i64;
        percent.clamp(0, 100)
    }
}

/// Registry of progress entries, keyed by asset.
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    entries: Arc<DashMap<AssetId, ProgressEntry>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset` as queued, resetting any previous entry.
    pub fn start(&self, asset: AssetId) {
        self.entries.insert(asset, ProgressEntry::queued());
    }

    /// Set the expected frame total.
    pub fn set_max(&self, asset: AssetId, max_frames: u64) {
        if let Some(entry) = self.entries.get(&asset) {
            entry.max_frames.store(max_frames, Ordering::Release);
        }
    }

    /// Record the latest encoded frame.
    ///
    /// Ignored for unknown assets and for jobs already marked failed.
    pub fn report(&self, asset: AssetId, frame: u64) {
        if let Some(entry) = self.entries.get(&asset) {
            let frame = i64::try_from(frame).unwrap_or(i64::MAX);
            let _ = entry
                .current_frame
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current != FAILED).then_some(frame)
                });
        }
    }

    /// Apply a parsed progress update.
    pub fn apply(&self, asset: AssetId, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Frame(frame) => self.report(asset, frame),
            ProgressUpdate::Finished => {}
        }
    }

    /// Mark the job failed. The entry stays until removed or purged.
    pub fn fail(&self, asset: AssetId) {
        self.entries
            .entry(asset)
            .or_insert_with(ProgressEntry::queued)
            .current_frame
            .store(FAILED, Ordering::Release);
    }

    pub fn remove(&self, asset: AssetId) {
        self.entries.remove(&asset);
    }

    /// Percentage or sentinel, `None` when there is no entry.
    pub fn get(&self, asset: AssetId) -> Option<i64> {
        self.entries.get(&asset).map(|entry| entry.percent())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop a failed entry after `grace`, unless it was restarted meanwhile.
    pub fn schedule_purge(&self, asset: AssetId, grace: Duration) {
        let entries = self.entries.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let purged = entries
                .remove_if(&asset, |_, entry| {
                    entry.current_frame.load(Ordering::Acquire) == FAILED
                })
                .is_some();
            if purged {
                tracing::debug!(asset_id = %asset, "Purged failed progress entry");
            }
        });
    }
}
