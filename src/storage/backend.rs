//! The blob store seam.
//!
//! [`ObjectStore`](super::ObjectStore) implements chunked uploads, sessions and
//! upload accounting on top of a much smaller contract: whole-object puts,
//! server-side compose, seekable reads, deletes and prefix listing.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncSeek};

/// Size and entity tag of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    /// Opaque, unquoted entity tag.
    pub etag: String,
}

/// Seekable object body.
pub trait ObjectReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ObjectReader for T {}

/// An open object: its reader plus the stat taken when it was opened.
pub struct StoredObject {
    pub reader: Box<dyn ObjectReader>,
    pub stat: ObjectStat,
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}

/// Backing blob store.
///
/// Keys are `/`-separated strings. Implementations must make `put` and
/// `compose` atomic: a reader never observes a partially written object.
#[async_trait]
pub trait BlobBackend: Send + Sync + 'static {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> io::Result<()>;

    /// Concatenate `parts` in order into `dest`. Returns the composed size.
    ///
    /// An empty `parts` list produces an empty object.
    async fn compose(&self, dest: &str, parts: &[String]) -> io::Result<u64>;

    /// Open `key` for reading, `None` when absent.
    async fn open(&self, key: &str) -> io::Result<Option<StoredObject>>;

    async fn stat(&self, key: &str) -> io::Result<Option<ObjectStat>>;

    /// Delete `key`. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> io::Result<()>;

    /// Keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> io::Result<Vec<String>>;
}
