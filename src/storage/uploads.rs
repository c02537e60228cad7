//! Per-asset in-flight upload accounting.

use cliphost_common::AssetId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Counts in-flight upload sessions per asset.
///
/// Each asset gets its own watch channel, so waiting for one asset to drain
/// never contends with uploads to another. Entries are dropped when their
/// count returns to zero.
#[derive(Debug, Clone, Default)]
pub struct ActiveUploads {
    counters: Arc<DashMap<AssetId, watch::Sender<usize>>>,
}

impl ActiveUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight upload. The count drops when the guard does.
    pub fn begin(&self, asset: AssetId) -> UploadGuard {
        self.counters
            .entry(asset)
            .or_insert_with(|| watch::channel(0).0)
            .send_modify(|n| *n += 1);

        UploadGuard {
            counters: self.counters.clone(),
            asset,
        }
    }

    /// Current number of in-flight uploads for `asset`.
    pub fn count(&self, asset: AssetId) -> usize {
        self.counters
            .get(&asset)
            .map(|tx| *tx.borrow())
            .unwrap_or(0)
    }

    pub fn is_active(&self, asset: AssetId) -> bool {
        self.count(asset) > 0
    }

    /// Resolve once `asset` has no in-flight uploads.
    pub async fn wait_idle(&self, asset: AssetId) {
        let Some(mut rx) = self.counters.get(&asset).map(|tx| tx.subscribe()) else {
            return;
        };
        // A closed channel means the entry was dropped at zero.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Keeps an asset's upload count raised while alive.
#[derive(Debug)]
pub struct UploadGuard {
    counters: Arc<DashMap<AssetId, watch::Sender<usize>>>,
    asset: AssetId,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.counters.get(&self.asset) {
            tx.send_modify(|n| *n = n.saturating_sub(1));
        }
        self.counters
            .remove_if(&self.asset, |_, tx| *tx.borrow() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_counts_follow_guards() {
        let uploads = ActiveUploads::new();
        let asset = AssetId::new();

        let first = uploads.begin(asset);
        let second = uploads.begin(asset);
        assert_eq!(uploads.count(asset), 2);

        drop(first);
        assert!(uploads.is_active(asset));
        drop(second);
        assert!(!uploads.is_active(asset));
        assert!(uploads.counters.is_empty());
    }

    #[test]
    fn test_assets_are_independent() {
        let uploads = ActiveUploads::new();
        let a = AssetId::new();
        let b = AssetId::new();

        let _guard = uploads.begin(a);
        assert!(uploads.is_active(a));
        assert!(!uploads.is_active(b));
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_on_last_guard() {
        let uploads = ActiveUploads::new();
        let asset = AssetId::new();

        uploads.wait_idle(asset).await;

        let guard = uploads.begin(asset);
        let waiter = {
            let uploads = uploads.clone();
            tokio::spawn(async move { uploads.wait_idle(asset).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
