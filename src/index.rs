//! Track index model and the delete-side reindex.
//!
//! `tracks.json` is a derived catalog artifact maintained by an external
//! ingestion process; the gateway only removes entries from it after a
//! delete. Entry fields beyond `file` are opaque and pass through the
//! rewrite byte-for-byte (modulo formatting).

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{ObjectStore, StoreError};
use crate::{Error, Result};

/// One catalog entry. Only `file` is meaningful to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEntry {
    /// Object-store key this entry describes.
    pub file: String,
    /// Descriptive metadata the gateway passes through unmodified.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `tracks.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackIndex {
    /// Ordered catalog entries.
    pub tracks: Vec<TrackEntry>,
    /// Date of the last rewrite, `YYYY-MM-DD`.
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: String,
}

impl TrackIndex {
    /// Drop every entry whose `file` equals `key`, preserving the relative
    /// order of the survivors. Returns how many entries were removed.
    pub fn remove_file(&mut self, key: &str) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.file != key);
        before - self.tracks.len()
    }
}

/// Today's date at date-only granularity.
fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Rewrite the index after `deleted_key` was removed from the store.
///
/// Best-effort by design: a missing index is silently skipped (the index is a
/// derived artifact, not the source of truth). The read-modify-write runs
/// under a conditional-write loop so two concurrent deletes cannot drop each
/// other's removal; after `max_attempts` lost races it gives up with
/// [`Error::IndexConflict`].
pub async fn reindex_after_delete(
    store: &dyn ObjectStore,
    index_key: &str,
    deleted_key: &str,
    max_attempts: u32,
) -> Result<()> {
    for attempt in 1..=max_attempts {
        let Some(obj) = store.get(index_key).await? else {
            debug!(index = %index_key, "Index object absent, skipping reindex");
            return Ok(());
        };

        let mut index: TrackIndex =
            serde_json::from_slice(&obj.data).map_err(Error::IndexCorrupt)?;
        let removed = index.remove_file(deleted_key);
        index.last_updated = today();

        let body = serde_json::to_vec_pretty(&index)?;
        match store
            .put_if_match(index_key, Bytes::from(body), "application/json", Some(&obj.etag))
            .await
        {
            Ok(_) => {
                debug!(key = %deleted_key, removed, attempt, "Index rewritten");
                return Ok(());
            }
            Err(StoreError::PreconditionFailed { .. }) => {
                warn!(key = %deleted_key, attempt, "Index rewrite lost a race, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::IndexConflict(max_attempts))
}
