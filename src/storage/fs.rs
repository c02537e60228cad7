//! Filesystem blob backend.
//!
//! Objects are plain files under a root directory, one directory per asset.
//! Writes go to a hidden temp file in the destination directory and are
//! renamed into place, so readers only ever see complete objects.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::backend::{BlobBackend, ObjectStat, StoredObject};

#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Create the backend, creating `root` if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid object key '{key}'"),
            ));
        }
        Ok(self.root.join(relative))
    }

    async fn staging_file(&self, dest: &Path) -> io::Result<(fs::File, TempPath)> {
        let dir = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).await?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = TempPath(Some(dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))));
        let file = fs::File::create(temp.path()).await?;
        Ok((file, temp))
    }
}

/// Removes an unfinished temp file when dropped, including when the owning
/// future is cancelled mid-write.
struct TempPath(Option<PathBuf>);

impl TempPath {
    fn path(&self) -> &Path {
        self.0.as_deref().unwrap_or(Path::new(""))
    }

    async fn persist(mut self, dest: &Path) -> io::Result<()> {
        if let Some(path) = self.0.take() {
            if let Err(e) = fs::rename(&path, dest).await {
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn file_etag(meta: &std::fs::Metadata) -> String {
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(meta.len().to_le_bytes());
    hasher.update(modified.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

fn not_found_is_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl BlobBackend for FsBackend {
    async fn put(&self, key: &str, data: Bytes) -> io::Result<()> {
        let dest = self.path(key)?;
        let (mut file, temp) = self.staging_file(&dest).await?;

        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);

        temp.persist(&dest).await
    }

    async fn compose(&self, dest: &str, parts: &[String]) -> io::Result<u64> {
        let dest = self.path(dest)?;
        let (mut file, temp) = self.staging_file(&dest).await?;

        let mut total = 0;
        for part in parts {
            let mut source = fs::File::open(self.path(part)?).await?;
            total += tokio::io::copy(&mut source, &mut file).await?;
        }
        file.flush().await?;
        drop(file);

        temp.persist(&dest).await?;
        Ok(total)
    }

    async fn open(&self, key: &str) -> io::Result<Option<StoredObject>> {
        let path = self.path(key)?;
        let Some(file) = not_found_is_none(fs::File::open(&path).await)? else {
            return Ok(None);
        };

        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Ok(None);
        }

        Ok(Some(StoredObject {
            stat: ObjectStat {
                size: meta.len(),
                etag: file_etag(&meta),
            },
            reader: Box::new(file),
        }))
    }

    async fn stat(&self, key: &str) -> io::Result<Option<ObjectStat>> {
        let path = self.path(key)?;
        Ok(not_found_is_none(fs::metadata(&path).await)?
            .filter(|meta| meta.is_file())
            .map(|meta| ObjectStat {
                size: meta.len(),
                etag: file_etag(&meta),
            }))
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        let path = self.path(key)?;
        not_found_is_none(fs::remove_file(&path).await)?;

        // Drop the asset directory once its last object is gone.
        if let Some(dir) = path.parent() {
            if dir != self.root {
                let _ = fs::remove_dir(dir).await;
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let (dir, name_prefix) = match prefix.rsplit_once('/') {
            Some((dir, rest)) => (dir, rest),
            None => ("", prefix),
        };
        let dir_path = if dir.is_empty() {
            self.root.clone()
        } else {
            self.path(dir)?
        };

        let Some(mut entries) = not_found_is_none(fs::read_dir(&dir_path).await)? else {
            return Ok(Vec::new());
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.starts_with(name_prefix) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            keys.push(if dir.is_empty() {
                name
            } else {
                format!("{dir}/{name}")
            });
        }
        keys.sort();
        Ok(keys)
    }
}
