//! Default session backend and backend selection.

use crate::config::{SessionBackend, SessionConfig};
use crate::error::SessionResult;
use crate::handler::SessionHandler;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct StoredSession {
    data: String,
    updated_at: DateTime<Utc>,
}

/// In-process session handler without locking.
///
/// Used when no document store is configured, and as the default fallback once
/// a document store becomes unreachable. `gc` removes sessions not written for
/// longer than `max_lifetime`.
pub struct MemorySessionHandler {
    sessions: DashMap<String, StoredSession>,
}

impl MemorySessionHandler {
    /// Create a new in-memory handler.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for MemorySessionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHandler for MemorySessionHandler {
    async fn has_connection(&self) -> SessionResult<bool> {
        Ok(true)
    }

    async fn read(&self, session_id: &str) -> SessionResult<String> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|session| session.data.clone())
            .unwrap_or_default())
    }

    async fn write(&self, session_id: &str, data: &str) -> SessionResult<bool> {
        self.sessions.insert(
            session_id.to_string(),
            StoredSession {
                data: data.to_string(),
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<bool> {
        self.sessions.remove(session_id);
        Ok(true)
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<bool> {
        // No representable cutoff means nothing can be that old.
        let Some(cutoff) = TimeDelta::from_std(max_lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_sub_signed(lifetime))
        else {
            return Ok(true);
        };

        self.sessions.retain(|_, session| session.updated_at >= cutoff);
        Ok(true)
    }
}

/// Select the session handler for a configuration.
///
/// A MongoDB descriptor with a database name yields a
/// [`LockingSessionStore`](crate::store::LockingSessionStore)
/// that falls back to `fallback` if the server turns out to be unreachable.
/// Any other descriptor, or one missing its database name, returns `fallback`
/// itself.
///
/// # Examples
///
/// ```
/// use armature_mongo_session::*;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let fallback: Arc<dyn SessionHandler> = Arc::new(MemorySessionHandler::new());
/// let handler = open_session_handler(&SessionConfig::new("/tmp/sessions"), fallback);
///
/// handler.write("abc", "foo").await?;
/// assert_eq!(handler.read("abc").await?, "foo");
/// # Ok::<(), SessionError>(())
/// # });
/// ```
pub fn open_session_handler(
    config: &SessionConfig,
    fallback: Arc<dyn SessionHandler>,
) -> Arc<dyn SessionHandler> {
    match config.backend() {
        #[cfg(feature = "mongodb")]
        Ok(SessionBackend::Mongo { uri, database }) => {
            info!(database = %database, collection = %config.collection, "Using MongoDB session store");
            let store = crate::stores::MongoDocumentStore::from_config(config, &uri, &database);
            Arc::new(crate::store::LockingSessionStore::new(config.clone(), store, fallback))
        }
        #[cfg(not(feature = "mongodb"))]
        Ok(SessionBackend::Mongo { .. }) => {
            warn!("MongoDB session store requested but the `mongodb` feature is disabled");
            fallback
        }
        Ok(SessionBackend::Fallback) => {
            info!("Using fallback session handler");
            fallback
        }
        Err(err) => {
            warn!(error = %err, "Invalid session save path, using fallback session handler");
            fallback
        }
    }
}
