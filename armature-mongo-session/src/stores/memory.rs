//! In-memory document store
//!
//! Uses DashMap so that updates to one record are serialised the way the
//! remote store serialises updates to one document. Suitable for
//! single-instance deployments or testing.

use crate::error::SessionResult;
use crate::record::{LockSnapshot, SessionRecord};
use crate::stores::DocumentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

/// In-memory document store
pub struct MemoryDocumentStore {
    records: DashMap<String, SessionRecord>,
}

impl MemoryDocumentStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory session document store");
        Self {
            records: DashMap::new(),
        }
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: SessionRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Get a copy of a record.
    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ensure_ready(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn increment_lock(&self, id: &str) -> SessionResult<LockSnapshot> {
        let mut entry = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| SessionRecord::new(id));

        entry.lock += 1;
        trace!(id = %id, lock = entry.lock, "Incremented session lock");

        Ok(LockSnapshot {
            lock: entry.lock,
            data: entry.data.clone(),
        })
    }

    async fn claim(&self, id: &str, owner: &str, expires: DateTime<Utc>) -> SessionResult<()> {
        if let Some(mut entry) = self.records.get_mut(id) {
            entry.owner = Some(owner.to_string());
            entry.lock = 1;
            entry.expires = Some(expires);
        }
        Ok(())
    }

    async fn update_owned(&self, id: &str, owner: &str, data: &str) -> SessionResult<bool> {
        match self.records.get_mut(id) {
            Some(mut entry) if entry.owner.as_deref() == Some(owner) => {
                entry.data = Some(data.to_string());
                entry.lock = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        self.records.remove(id);
        Ok(())
    }

    async fn remove_expired(&self, before: DateTime<Utc>) -> SessionResult<u64> {
        let initial = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(before));
        Ok((initial - self.records.len()) as u64)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_increment_creates_record() {
        let store = MemoryDocumentStore::new();

        let snapshot = store.increment_lock("abc").await.unwrap();
        assert_eq!(snapshot, LockSnapshot { lock: 1, data: None });

        let snapshot = store.increment_lock("abc").await.unwrap();
        assert_eq!(snapshot.lock, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_increment_returns_data() {
        let store = MemoryDocumentStore::new();
        store.insert(SessionRecord::new("abc").with_data("payload"));

        let snapshot = store.increment_lock("abc").await.unwrap();
        assert_eq!(snapshot.data.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn test_claim_resets_lock() {
        let store = MemoryDocumentStore::new();
        store.insert(SessionRecord::new("abc").locked_by("dead", 15));

        let expires = Utc::now() + Duration::minutes(5);
        store.claim("abc", "me", expires).await.unwrap();

        let record = store.get("abc").unwrap();
        assert_eq!(record.lock, 1);
        assert_eq!(record.owner.as_deref(), Some("me"));
        assert_eq!(record.expires, Some(expires));
    }

    #[tokio::test]
    async fn test_update_owned_checks_owner() {
        let store = MemoryDocumentStore::new();
        store.insert(SessionRecord::new("abc").with_data("old").locked_by("me", 1));

        assert!(!store.update_owned("abc", "other", "new").await.unwrap());
        assert_eq!(store.get("abc").unwrap().data.as_deref(), Some("old"));

        assert!(store.update_owned("abc", "me", "new").await.unwrap());
        let record = store.get("abc").unwrap();
        assert_eq!(record.data.as_deref(), Some("new"));
        assert_eq!(record.lock, 0);

        assert!(!store.update_owned("missing", "me", "new").await.unwrap());
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_remove_expired() {
        let store = MemoryDocumentStore::new();
        let now = Utc::now();
        store.insert(SessionRecord::new("old").expiring_at(now - Duration::seconds(10)));
        store.insert(SessionRecord::new("fresh").expiring_at(now + Duration::seconds(10)));
        store.insert(SessionRecord::new("never"));

        assert_eq!(store.remove_expired(now).await.unwrap(), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
        assert!(store.get("never").is_some());
    }
}
