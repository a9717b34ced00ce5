//! Filesystem-backed object store
//!
//! Maps object keys onto paths under a root directory. Keys are validated
//! before path resolution so a crafted key can never escape the root.
//!
//! Conditional writes take a store-wide async mutex for the read-compare-write
//! sequence; that is coarse but correct for a single-process deployment, and
//! the etag check still guards against writers outside this process.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ObjectStore, StoreError, StoredObject, content_etag};

/// Store rooted at a local directory.
pub struct FsStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Resolve a key to a path under the root, rejecting traversal.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.starts_with('/') || key.contains('\\') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let rel = Path::new(key);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }

    async fn read(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let etag = content_etag(&data);
                Ok(Some(StoredObject {
                    data: Bytes::from(data),
                    content_type: None,
                    etag,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via temp file + rename so readers never observe a torn object.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.partial"));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.read(key).await
    }

    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<String, StoreError> {
        let path = self.resolve(key)?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, &data).await?;
        Ok(content_etag(&data))
    }

    async fn put_if_match(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let path = self.resolve(key)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read(key).await?;
        let matches = match (&current, expected) {
            (Some(obj), Some(tag)) => obj.etag == tag,
            (None, None) => true,
            _ => false,
        };
        if !matches {
            debug!(key = %key, "Conditional write lost to a concurrent update");
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
            });
        }

        self.write(&path, &data).await?;
        Ok(content_etag(&data))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_dir, store) = store();
        store
            .put("album/a.mp3", Bytes::from_static(b"riff"), "audio/mpeg")
            .await
            .unwrap();

        let obj = store.get("album/a.mp3").await.unwrap().unwrap();
        assert_eq!(&obj.data[..], b"riff");
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, store) = store();
        for key in ["../secrets", "/etc/passwd", "a/../../b", ""] {
            let err = store.get(key).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key: {key:?}");
        }
    }

    #[tokio::test]
    async fn delete_of_absent_key_succeeds() {
        let (_dir, store) = store();
        store.delete("never-there.mp3").await.unwrap();
    }

    #[tokio::test]
    async fn conditional_write_detects_outside_modification() {
        let (_dir, store) = store();
        let etag = store
            .put("tracks.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();

        // Another writer replaces the object
        store
            .put("tracks.json", Bytes::from_static(b"{ }"), "application/json")
            .await
            .unwrap();

        let err = store
            .put_if_match(
                "tracks.json",
                Bytes::from_static(b"{\"tracks\":[]}"),
                "application/json",
                Some(&etag),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }
}
