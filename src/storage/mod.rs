//! Object storage for uploaded sources and encoder output.
//!
//! [`ObjectStore`] turns an arbitrary byte stream into a stored object by
//! staging fixed-size parts and composing them server-side. Only one upload
//! session may target a key at a time: a new session for the same key cancels
//! its predecessor, waits for that session's cleanup, then starts over.

pub mod backend;
mod fs;
mod memory;
mod uploads;

pub use backend::{BlobBackend, ObjectReader, ObjectStat, StoredObject};
pub use fs::FsBackend;
pub use memory::MemoryBackend;
pub use uploads::{ActiveUploads, UploadGuard};

use bytes::{Bytes, BytesMut};
use cliphost_common::{asset_prefix, AssetId, ObjectKey};
use dashmap::DashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default part size for chunked uploads.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload exceeds the maximum size of {limit} bytes")]
    UploadSizeExceeded { limit: u64 },

    #[error("upload to {key} was superseded by a newer upload")]
    UploadAborted { key: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("backing store error: {0}")]
    Backend(#[from] io::Error),
}

impl StorageError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Limits applied to chunked uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub chunk_size: usize,
    pub max_upload_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: 5_000_000_000,
        }
    }
}

struct UploadSession {
    id: Uuid,
    token: CancellationToken,
    /// Cancelled once the session's parts are cleaned up.
    finished: CancellationToken,
}

/// Chunked, supersedable object storage over a [`BlobBackend`].
///
/// Cheap to clone; clones share sessions and upload counters.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn BlobBackend>,
    limits: UploadLimits,
    sessions: Arc<DashMap<String, Arc<UploadSession>>>,
    uploads: ActiveUploads,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn BlobBackend>, limits: UploadLimits) -> Self {
        Self {
            backend,
            limits,
            sessions: Arc::new(DashMap::new()),
            uploads: ActiveUploads::new(),
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Stream `reader` into `key` as numbered parts, then compose them.
    ///
    /// Returns the composed size. On failure or supersession every part this
    /// session wrote is deleted and `key` is left untouched.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UploadSizeExceeded`] once the input passes the limit
    /// - [`StorageError::UploadAborted`] when a newer upload for `key` starts
    /// - [`StorageError::Backend`] on read or backing-store failures
    pub async fn put_chunked<R>(&self, key: &ObjectKey, mut reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let _active = self.uploads.begin(key.asset());
        let mut session = self.begin_session(key).await;

        let result = self.upload_parts(key, &mut session, &mut reader).await;
        match &result {
            Ok(size) => tracing::debug!(%key, size, parts = session.parts.len(), "Composed upload"),
            Err(e) => tracing::warn!(%key, error = %e, "Upload failed"),
        }

        session.cleanup().await;
        result
    }

    async fn begin_session(&self, key: &ObjectKey) -> SessionHandle {
        let target = key.to_string();
        let session = Arc::new(UploadSession {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            finished: CancellationToken::new(),
        });

        let previous = self.sessions.insert(target.clone(), session.clone());

        // Armed before waiting so a dropped caller still releases the key.
        let mut handle = SessionHandle {
            store: self.clone(),
            target,
            session,
            predecessor: previous,
            parts: Vec::new(),
        };

        if let Some(previous) = handle.predecessor.clone() {
            tracing::debug!(%key, "Superseding in-flight upload");
            previous.token.cancel();
            previous.finished.cancelled().await;
            handle.predecessor = None;
        }

        handle
    }

    async fn upload_parts<R>(
        &self,
        key: &ObjectKey,
        session: &mut SessionHandle,
        reader: &mut R,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let token = session.session.token.clone();
        let aborted = || StorageError::UploadAborted {
            key: key.to_string(),
        };

        let mut total: u64 = 0;
        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Err(aborted()),
                chunk = read_chunk(reader, self.limits.chunk_size) => chunk?,
            };
            if chunk.is_empty() {
                break;
            }

            total += chunk.len() as u64;
            if total > self.limits.max_upload_size {
                return Err(StorageError::UploadSizeExceeded {
                    limit: self.limits.max_upload_size,
                });
            }

            let part = key.part(session.parts.len());
            session.parts.push(part.clone());
            tokio::select! {
                _ = token.cancelled() => return Err(aborted()),
                put = self.backend.put(&part, chunk) => put?,
            }
        }

        if token.is_cancelled() {
            return Err(aborted());
        }
        Ok(self.backend.compose(&key.to_string(), &session.parts).await?)
    }

    /// Open `key` for reading.
    pub async fn get(&self, key: &ObjectKey) -> Result<StoredObject> {
        self.backend
            .open(&key.to_string())
            .await?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    pub async fn stat(&self, key: &ObjectKey) -> Result<Option<ObjectStat>> {
        Ok(self.backend.stat(&key.to_string()).await?)
    }

    pub async fn exists(&self, key: &ObjectKey) -> Result<bool> {
        Ok(self.stat(key).await?.is_some())
    }

    pub async fn delete(&self, key: &ObjectKey) -> Result<()> {
        Ok(self.backend.delete(&key.to_string()).await?)
    }

    /// Delete every object of `asset`. Returns how many were removed.
    pub async fn delete_by_prefix(&self, asset: AssetId) -> Result<usize> {
        let keys = self.backend.list(&asset_prefix(asset)).await?;
        for key in &keys {
            self.backend.delete(key).await?;
        }
        tracing::debug!(asset_id = %asset, count = keys.len(), "Deleted asset objects");
        Ok(keys.len())
    }

    /// Whether any upload session for `asset` is still in flight.
    pub fn has_active_uploads(&self, asset: AssetId) -> bool {
        self.uploads.is_active(asset)
    }

    /// Resolve once `asset` has no in-flight upload sessions.
    pub async fn wait_for_uploads(&self, asset: AssetId) {
        self.uploads.wait_idle(asset).await
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("limits", &self.limits)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// One live upload session and the parts it has staged.
///
/// Dropping the handle without [`SessionHandle::cleanup`] (for instance when
/// the upload future is cancelled) still deletes the staged parts in a
/// background task before the session is marked finished. A handle dropped
/// while its predecessor is still cleaning up stays registered and finishes
/// only after the predecessor does, so a later session never races that
/// cleanup on shared part names.
struct SessionHandle {
    store: ObjectStore,
    target: String,
    session: Arc<UploadSession>,
    /// Superseded session not yet confirmed finished.
    predecessor: Option<Arc<UploadSession>>,
    parts: Vec<String>,
}

impl SessionHandle {
    async fn cleanup(mut self) {
        let parts = std::mem::take(&mut self.parts);
        delete_parts(self.store.backend.as_ref(), &parts).await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let sessions = self.store.sessions.clone();
        let target = std::mem::take(&mut self.target);
        let id = self.session.id;
        let release = move || {
            sessions.remove_if(&target, |_, current| current.id == id);
        };

        let finished = self.session.finished.clone();
        let predecessor = self.predecessor.take();
        let parts = std::mem::take(&mut self.parts);
        if predecessor.is_none() && parts.is_empty() {
            release();
            finished.cancel();
            return;
        }

        let backend = self.store.backend.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(predecessor) = predecessor {
                        predecessor.finished.cancelled().await;
                    }
                    delete_parts(backend.as_ref(), &parts).await;
                    release();
                    finished.cancel();
                });
            }
            Err(_) => {
                release();
                finished.cancel();
            }
        }
    }
}

async fn delete_parts(backend: &dyn BlobBackend, parts: &[String]) {
    for part in parts {
        if let Err(e) = backend.delete(part).await {
            tracing::warn!(part = %part, error = %e, "Failed to delete upload part");
        }
    }
}

async fn read_chunk<R>(reader: &mut R, size: usize) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(size.min(DEFAULT_CHUNK_SIZE));
    let mut limited = reader.take(size as u64);
    while limited.read_buf(&mut buf).await? > 0 {}
    Ok(buf.freeze())
}
