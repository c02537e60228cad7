//! Integration tests for chunked uploads through the internal router.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cliphost::config::{ByteSize, Config};
use cliphost_common::{AssetId, ObjectKey};
use common::{body_bytes, body_json, get, TestHarness};
use tower::ServiceExt;

fn upload(uri: &str, data: Vec<u8>) -> Request<Body> {
    Request::put(uri).body(Body::from(data)).unwrap()
}

fn small_chunks(max_upload: u64) -> Config {
    let mut config = Config::default();
    config.storage.chunk_size = ByteSize(64);
    config.storage.max_upload_size = ByteSize(max_upload);
    config
}

#[tokio::test]
async fn upload_then_read_back() {
    let h = TestHarness::with_config(small_chunks(10_000));
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/raw");
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let resp = h.internal().oneshot(upload(&uri, data.clone())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp.into_body()).await["size"], 1000);

    // Only the composed object remains once the parts are merged.
    assert_eq!(h.backend.keys(), vec![ObjectKey::raw(asset).to_string()]);

    let resp = h.internal().oneshot(get(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp.into_body()).await[..], &data[..]);
}

#[tokio::test]
async fn post_is_accepted_for_uploads() {
    let h = TestHarness::new();
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/thumbnail.jpg");

    let resp = h
        .internal()
        .oneshot(Request::post(&uri).body(Body::from("jpeg")).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(
        h.backend.contents(&ObjectKey::thumbnail(asset).to_string()).unwrap(),
        "jpeg"
    );
}

#[tokio::test]
async fn empty_upload_creates_empty_object() {
    let h = TestHarness::new();
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/raw");

    let resp = h.internal().oneshot(upload(&uri, Vec::new())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp.into_body()).await["size"], 0);

    let resp = h.internal().oneshot(get(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp.into_body()).await.is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_cleaned_up() {
    let h = TestHarness::with_config(small_chunks(100));
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/raw");

    let resp = h.internal().oneshot(upload(&uri, vec![7u8; 500])).await.unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(resp.into_body()).await["code"], "upload_too_large");
    assert!(h.backend.is_empty(), "left behind: {:?}", h.backend.keys());
}

#[tokio::test]
async fn upload_at_exact_limit_succeeds() {
    let h = TestHarness::with_config(small_chunks(128));
    let asset = AssetId::new();

    let resp = h
        .internal()
        .oneshot(upload(&format!("/objects/{asset}/raw"), vec![1u8; 128]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn reupload_replaces_object() {
    let h = TestHarness::new();
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/raw");

    h.internal().oneshot(upload(&uri, b"first".to_vec())).await.unwrap();
    h.internal().oneshot(upload(&uri, b"second".to_vec())).await.unwrap();

    let resp = h.internal().oneshot(get(&uri)).await.unwrap();
    assert_eq!(&body_bytes(resp.into_body()).await[..], b"second");
}

#[tokio::test]
async fn delete_object() {
    let h = TestHarness::new();
    let asset = AssetId::new();
    let uri = format!("/objects/{asset}/raw");
    h.put(&ObjectKey::raw(asset), b"data").await;

    let resp = h
        .internal()
        .oneshot(Request::delete(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = h.internal().oneshot(get(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_object_names_are_rejected() {
    let h = TestHarness::new();
    let asset = AssetId::new();

    for name in [".hidden", "a%2Fb"] {
        let resp = h
            .internal()
            .oneshot(upload(&format!("/objects/{asset}/{name}"), b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "name {name:?}");
        assert_eq!(body_json(resp.into_body()).await["code"], "invalid_key");
    }
    assert!(h.backend.is_empty());
}
