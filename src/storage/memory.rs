//! In-process blob backend.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::sync::Arc;

use super::backend::{BlobBackend, ObjectStat, StoredObject};

/// Blob backend holding every object in memory.
///
/// Used by tests and benchmarks. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Raw object contents, for assertions.
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).cloned()
    }
}

fn content_etag(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..16])
}

fn stat_of(data: &Bytes) -> ObjectStat {
    ObjectStat {
        size: data.len() as u64,
        etag: content_etag(data),
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn put(&self, key: &str, data: Bytes) -> io::Result<()> {
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn compose(&self, dest: &str, parts: &[String]) -> io::Result<u64> {
        let mut objects = self.objects.write();

        let mut composed = BytesMut::new();
        for part in parts {
            let data = objects.get(part).ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("missing part {part}"))
            })?;
            composed.extend_from_slice(data);
        }

        let size = composed.len() as u64;
        objects.insert(dest.to_string(), composed.freeze());
        Ok(size)
    }

    async fn open(&self, key: &str) -> io::Result<Option<StoredObject>> {
        Ok(self.objects.read().get(key).map(|data| StoredObject {
            stat: stat_of(data),
            reader: Box::new(Cursor::new(data.clone())),
        }))
    }

    async fn stat(&self, key: &str) -> io::Result<Option<ObjectStat>> {
        Ok(self.objects.read().get(key).map(stat_of))
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_compose_and_read() {
        let backend = MemoryBackend::new();
        backend.put("a/x-0", Bytes::from_static(b"hello ")).await.unwrap();
        backend.put("a/x-1", Bytes::from_static(b"world")).await.unwrap();

        let size = backend
            .compose("a/x", &["a/x-0".to_string(), "a/x-1".to_string()])
            .await
            .unwrap();
        assert_eq!(size, 11);

        let mut object = backend.open("a/x").await.unwrap().unwrap();
        let mut body = String::new();
        object.reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello world");
        assert_eq!(object.stat.size, 11);
    }

    #[tokio::test]
    async fn test_compose_missing_part_leaves_no_object() {
        let backend = MemoryBackend::new();
        let err = backend
            .compose("a/x", &["a/x-0".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(backend.stat("a/x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let backend = MemoryBackend::new();
        for key in ["a/raw", "a/manifest.mpd", "ab/raw", "b/raw"] {
            backend.put(key, Bytes::new()).await.unwrap();
        }
        assert_eq!(
            backend.list("a/").await.unwrap(),
            vec!["a/manifest.mpd".to_string(), "a/raw".to_string()]
        );
    }

    #[tokio::test]
    async fn test_etag_tracks_content() {
        let backend = MemoryBackend::new();
        backend.put("k", Bytes::from_static(b"one")).await.unwrap();
        let first = backend.stat("k").await.unwrap().unwrap().etag;
        backend.put("k", Bytes::from_static(b"two")).await.unwrap();
        let second = backend.stat("k").await.unwrap().unwrap().etag;
        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
    }
}
