//! Locking session store on top of a [`DocumentStore`].
//!
//! Each session document carries a `lock` counter. A reader atomically
//! increments it: a result of 1 means the lock was free, a result equal to the
//! break threshold means enough readers queued up behind a holder that it is
//! presumed dead. Either way the reader stamps its owner token, and only the
//! stamped owner's write is applied. Writes reset the counter to 0.
//!
//! No in-process mutex is involved; the store's per-document atomicity is the
//! only synchronisation.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::handler::SessionHandler;
use crate::record::{LockSnapshot, LockState};
use crate::retry::{Attempt, retry_bounded};
use crate::stores::DocumentStore;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Session handler with per-session locking, backed by a document store.
///
/// Falls back to another handler for the rest of its lifetime once the
/// document store fails to connect.
///
/// # Examples
///
/// ```
/// use armature_mongo_session::*;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let documents = Arc::new(MemoryDocumentStore::new());
/// let store = LockingSessionStore::new(
///     SessionConfig::default().with_owner("worker-1"),
///     documents.clone(),
///     Arc::new(MemorySessionHandler::new()),
/// );
///
/// assert_eq!(store.read("abc").await?, "");
/// store.write("abc", "cart=3").await?;
/// assert_eq!(documents.get("abc").unwrap().data.as_deref(), Some("cart=3"));
/// # Ok::<(), SessionError>(())
/// # });
/// ```
pub struct LockingSessionStore<S> {
    config: SessionConfig,
    store: S,
    fallback: Arc<dyn SessionHandler>,
    disabled: AtomicBool,
}

impl<S: DocumentStore> LockingSessionStore<S> {
    /// Create a new locking store.
    ///
    /// # Arguments
    ///
    /// * `config` - Lock thresholds, lifetime, cleaning factor and owner token
    /// * `store` - Document store holding the session records
    /// * `fallback` - Handler used once the document store is disabled
    pub fn new(config: SessionConfig, store: S, fallback: Arc<dyn SessionHandler>) -> Self {
        Self {
            config,
            store,
            fallback,
            disabled: AtomicBool::new(false),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the document store.
    pub fn document_store(&self) -> &S {
        &self.store
    }

    /// Whether operations are delegated to the fallback handler.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Switch to the fallback handler for good.
    fn disable(&self, err: &SessionError) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            error!(
                store = self.store.store_type(),
                error = %err,
                "Session document store unavailable, using fallback handler"
            );
        }
    }

    /// Log a failed data operation, disabling the store on connection loss.
    fn handle_failure(&self, operation: &str, session_id: &str, err: SessionError) {
        if err.is_connection_error() {
            self.disable(&err);
        } else {
            warn!(operation = operation, id = %session_id, error = %err, "Session command failed");
        }
    }

    /// Acquire the lock on a session, returning the stored payload.
    ///
    /// Fails with [`SessionError::LockTimeout`] when the lock stayed contended
    /// for every attempt.
    async fn acquire(&self, session_id: &str) -> SessionResult<LockSnapshot> {
        let break_after = self.config.break_after;
        let policy = self.config.retry_policy();

        let acquired = retry_bounded(&policy, move |attempt| async move {
            let snapshot = self.store.increment_lock(session_id).await?;
            match LockState::classify(snapshot.lock, break_after) {
                LockState::Acquired => Ok::<_, SessionError>(Attempt::Done(snapshot)),
                LockState::Broken => {
                    info!(
                        id = %session_id,
                        lock = snapshot.lock,
                        attempt = attempt,
                        "Breaking abandoned session lock"
                    );
                    Ok(Attempt::Done(snapshot))
                }
                LockState::Contended(lock) => {
                    debug!(id = %session_id, lock = lock, attempt = attempt, "Session locked");
                    Ok(Attempt::Retry)
                }
            }
        })
        .await?;

        let Some(snapshot) = acquired else {
            return Err(SessionError::LockTimeout {
                attempts: policy.max_attempts.max(1),
            });
        };

        let expires = expiry_after(Utc::now(), self.config.lifetime);
        self.store
            .claim(session_id, &self.config.owner, expires)
            .await?;

        Ok(snapshot)
    }

    /// Decide whether this `gc` call sweeps.
    fn should_collect(&self) -> bool {
        match self.config.cleaning_factor {
            0 => false,
            1 => true,
            factor => rand::rng().random_range(1..=factor) == 1,
        }
    }
}

/// Expiry for a lock taken at `now`, saturating at the latest representable time.
fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl<S: DocumentStore> SessionHandler for LockingSessionStore<S> {
    async fn has_connection(&self) -> SessionResult<bool> {
        if self.is_disabled() {
            return self.fallback.has_connection().await;
        }

        match self.store.ensure_ready().await {
            Ok(()) => Ok(true),
            Err(err) => {
                self.disable(&err);
                Ok(false)
            }
        }
    }

    async fn read(&self, session_id: &str) -> SessionResult<String> {
        if self.is_disabled() {
            return self.fallback.read(session_id).await;
        }

        match self.acquire(session_id).await {
            Ok(snapshot) => Ok(snapshot.data.unwrap_or_default()),
            Err(SessionError::LockTimeout { attempts }) => {
                debug!(
                    id = %session_id,
                    attempts = attempts,
                    "Session lock not acquired, continuing with empty session"
                );
                Ok(String::new())
            }
            Err(err) => {
                self.handle_failure("read", session_id, err);
                Ok(String::new())
            }
        }
    }

    async fn write(&self, session_id: &str, data: &str) -> SessionResult<bool> {
        if self.is_disabled() {
            return self.fallback.write(session_id, data).await;
        }

        // A lost lock leaves the newer holder's data in place.
        match self
            .store
            .update_owned(session_id, &self.config.owner, data)
            .await
        {
            Ok(applied) => {
                if !applied {
                    debug!(id = %session_id, "Session lock lost, write skipped");
                }
                Ok(true)
            }
            Err(err) => {
                self.handle_failure("write", session_id, err);
                Ok(true)
            }
        }
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<bool> {
        if self.is_disabled() {
            return self.fallback.destroy(session_id).await;
        }

        match self.store.remove(session_id).await {
            Ok(()) => Ok(true),
            Err(err) => {
                self.handle_failure("destroy", session_id, err);
                Ok(true)
            }
        }
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<bool> {
        if self.is_disabled() {
            return self.fallback.gc(max_lifetime).await;
        }

        if !self.should_collect() {
            return Ok(true);
        }

        match self.store.remove_expired(Utc::now()).await {
            Ok(removed) => {
                debug!(removed = removed, "Collected expired sessions");
                Ok(true)
            }
            Err(err) => {
                self.handle_failure("gc", "*", err);
                Ok(false)
            }
        }
    }
}
