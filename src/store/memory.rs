//! In-memory object store
//!
//! Backs tests and throwaway deployments. Conditional writes are atomic per
//! key via the map's entry lock.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ObjectStore, StoreError, StoredObject, content_etag};

/// DashMap-backed store.
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.objects.get(key).map(|o| o.clone()))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String, StoreError> {
        let etag = content_etag(&data);
        self.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: Some(content_type.to_string()),
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn put_if_match(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        expected: Option<&str>,
    ) -> Result<String, StoreError> {
        let etag = content_etag(&data);
        let entry = self.objects.entry(key.to_string());

        // The entry guard holds the shard lock, so compare-and-swap is atomic.
        match (entry, expected) {
            (Entry::Occupied(mut occ), Some(tag)) if occ.get().etag == tag => {
                occ.insert(StoredObject {
                    data,
                    content_type: Some(content_type.to_string()),
                    etag: etag.clone(),
                });
                Ok(etag)
            }
            (Entry::Vacant(vac), None) => {
                vac.insert(StoredObject {
                    data,
                    content_type: Some(content_type.to_string()),
                    etag: etag.clone(),
                });
                Ok(etag)
            }
            _ => Err(StoreError::PreconditionFailed {
                key: key.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_absent_key() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store
            .put("a.mp3", Bytes::from_static(b"riff"), "audio/mpeg")
            .await
            .unwrap();

        let obj = store.get("a.mp3").await.unwrap().unwrap();
        assert_eq!(&obj.data[..], b"riff");
        assert_eq!(obj.content_type.as_deref(), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .put("a.mp3", Bytes::from_static(b"riff"), "audio/mpeg")
            .await
            .unwrap();

        store.delete("a.mp3").await.unwrap();
        store.delete("a.mp3").await.unwrap();
        assert!(store.get("a.mp3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_write_rejects_stale_etag() {
        let store = MemoryStore::new();
        let etag = store
            .put("idx", Bytes::from_static(b"v1"), "application/json")
            .await
            .unwrap();

        // First writer wins
        store
            .put_if_match("idx", Bytes::from_static(b"v2"), "application/json", Some(&etag))
            .await
            .unwrap();

        // Second writer holds the stale etag
        let err = store
            .put_if_match("idx", Bytes::from_static(b"v3"), "application/json", Some(&etag))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));

        let obj = store.get("idx").await.unwrap().unwrap();
        assert_eq!(&obj.data[..], b"v2");
    }

    #[tokio::test]
    async fn conditional_create_requires_absence() {
        let store = MemoryStore::new();
        store
            .put_if_match("idx", Bytes::from_static(b"v1"), "application/json", None)
            .await
            .unwrap();

        let err = store
            .put_if_match("idx", Bytes::from_static(b"v2"), "application/json", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }
}
