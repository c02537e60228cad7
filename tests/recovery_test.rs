//! Startup recovery of assets left flagged as processing.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use cliphost::config::Config;
use cliphost::storage::MemoryBackend;
use cliphost::transcode::recover_assets;
use cliphost_common::ObjectKey;
use common::{EncodeMode, FakeEncoder, TestHarness};

#[tokio::test]
async fn flagged_assets_are_resubmitted() {
    let h = TestHarness::new();
    let pending = [h.seed_raw().await, h.seed_raw().await];

    let submitted = recover_assets(h.catalog(), &h.ctx.pool).await.unwrap();
    assert_eq!(submitted, 2);

    h.ctx.pool.drain().await;
    assert_eq!(h.encoder.encodes.load(Ordering::SeqCst), 2);
    for asset in pending {
        assert!(!h.asset_row(asset).unwrap().processing);
        assert!(h.ctx.store.exists(&ObjectKey::manifest(asset)).await.unwrap());
    }
}

#[tokio::test]
async fn finished_assets_are_left_alone() {
    let h = TestHarness::new();
    let done = h.seed_raw().await;
    h.catalog().set_processing(done, false).await.unwrap();
    let pending = h.seed_raw().await;

    let submitted = recover_assets(h.catalog(), &h.ctx.pool).await.unwrap();
    assert_eq!(submitted, 1);
    assert!(h.ctx.pool.is_active(pending));
    assert!(!h.ctx.pool.is_active(done));

    h.ctx.pool.drain().await;
}

#[tokio::test]
async fn recovery_skips_jobs_already_queued() {
    let backend = MemoryBackend::new();
    let encoder =
        FakeEncoder::new(backend.clone(), EncodeMode::Succeed).with_delay(Duration::from_millis(100));
    let h = TestHarness::build(Config::default(), encoder, backend);
    let asset = h.seed_raw().await;
    h.ctx.pool.submit(asset).unwrap();

    let submitted = recover_assets(h.catalog(), &h.ctx.pool).await.unwrap();
    assert_eq!(submitted, 0);

    h.ctx.pool.drain().await;
    assert_eq!(h.encoder.encodes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nothing_to_recover() {
    let h = TestHarness::new();

    assert_eq!(recover_assets(h.catalog(), &h.ctx.pool).await.unwrap(), 0);
    assert_eq!(h.ctx.pool.active_count(), 0);
}
