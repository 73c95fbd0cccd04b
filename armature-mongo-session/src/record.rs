//! Session documents and lock state.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One stored session document.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// Session identifier
    pub id: String,
    /// Opaque session payload
    pub data: Option<String>,
    /// Lock holder counter, 0 when unlocked
    pub lock: i64,
    /// Owner token of the current lock holder
    pub owner: Option<String>,
    /// Time after which garbage collection may remove the record
    pub expires: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Create an empty, unlocked record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            lock: 0,
            owner: None,
            expires: None,
        }
    }

    /// Set the payload.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Mark the record as locked by `owner`.
    pub fn locked_by(mut self, owner: impl Into<String>, lock: i64) -> Self {
        self.owner = Some(owner.into());
        self.lock = lock;
        self
    }

    /// Set the expiry.
    pub fn expiring_at(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Whether the record expired before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }
}

/// Fields returned by an atomic lock increment.
///
/// Deserialized straight from the store's projection; other fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LockSnapshot {
    /// Lock counter after the increment
    pub lock: i64,
    /// Payload stored at the time of the increment
    pub data: Option<String>,
}

/// Outcome of one lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// The lock was free.
    Acquired,
    /// Enough acquirers piled up that the previous holder is presumed dead.
    Broken,
    /// Someone else holds the lock.
    Contended(i64),
}

impl LockState {
    /// Classify a post-increment lock counter.
    pub fn classify(lock: i64, break_after: i64) -> Self {
        if lock == 1 {
            Self::Acquired
        } else if lock == break_after {
            Self::Broken
        } else {
            Self::Contended(lock)
        }
    }

    /// Whether the caller now holds the lock.
    pub fn is_held(&self) -> bool {
        !matches!(self, Self::Contended(_))
    }
}
