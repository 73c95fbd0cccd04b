//! Document storage backends
//!
//! This module provides the document stores a [`LockingSessionStore`] runs on:
//!
//! - **Memory**: In-memory storage using DashMap (single-instance, testing)
//! - **Mongo**: MongoDB `sessions` collection shared by every instance
//!
//! [`LockingSessionStore`]: crate::store::LockingSessionStore

mod memory;
#[cfg(feature = "mongodb")]
mod mongo;

pub use memory::MemoryDocumentStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoDocumentStore;

use crate::error::SessionResult;
use crate::record::LockSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Store primitives consumed by the locking protocol.
///
/// Every method touching a single document must be atomic for that document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Connect if needed, select the collection and ensure the `expires` index.
    ///
    /// Must be idempotent; it is called on every health check.
    async fn ensure_ready(&self) -> SessionResult<()>;

    /// Atomically increment `lock` on the record, creating it if absent.
    ///
    /// Returns the post-increment counter and the stored payload.
    async fn increment_lock(&self, id: &str) -> SessionResult<LockSnapshot>;

    /// Unconditionally stamp ownership: `owner`, `lock = 1`, `expires`.
    async fn claim(&self, id: &str, owner: &str, expires: DateTime<Utc>) -> SessionResult<()>;

    /// Replace the payload and reset `lock` to 0 if `owner` still holds the record.
    ///
    /// Returns whether a record matched.
    async fn update_owned(&self, id: &str, owner: &str, data: &str) -> SessionResult<bool>;

    /// Remove the record.
    async fn remove(&self, id: &str) -> SessionResult<()>;

    /// Remove every record whose `expires` is strictly before `before`.
    ///
    /// Returns the number of removed records.
    async fn remove_expired(&self, before: DateTime<Utc>) -> SessionResult<u64>;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn ensure_ready(&self) -> SessionResult<()> {
        (**self).ensure_ready().await
    }

    async fn increment_lock(&self, id: &str) -> SessionResult<LockSnapshot> {
        (**self).increment_lock(id).await
    }

    async fn claim(&self, id: &str, owner: &str, expires: DateTime<Utc>) -> SessionResult<()> {
        (**self).claim(id, owner, expires).await
    }

    async fn update_owned(&self, id: &str, owner: &str, data: &str) -> SessionResult<bool> {
        (**self).update_owned(id, owner, data).await
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        (**self).remove(id).await
    }

    async fn remove_expired(&self, before: DateTime<Utc>) -> SessionResult<u64> {
        (**self).remove_expired(before).await
    }

    fn store_type(&self) -> &'static str {
        (**self).store_type()
    }
}
