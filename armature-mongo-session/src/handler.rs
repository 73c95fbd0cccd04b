//! Session handler trait definition.

use crate::error::SessionResult;
use async_trait::async_trait;
use std::time::Duration;

/// Save handler contract shared by every session backend.
///
/// Payloads are opaque strings. An empty string means "no session data",
/// whether the session is new, its lock could not be acquired, or the stored
/// payload is empty.
///
/// # Examples
///
/// ```
/// use armature_mongo_session::{MemorySessionHandler, SessionHandler};
///
/// # tokio_test::block_on(async {
/// let handler = MemorySessionHandler::new();
/// assert!(handler.has_connection().await?);
///
/// handler.write("abc", "user_id|i:42;").await?;
/// assert_eq!(handler.read("abc").await?, "user_id|i:42;");
///
/// handler.destroy("abc").await?;
/// assert_eq!(handler.read("abc").await?, "");
/// # Ok::<(), armature_mongo_session::SessionError>(())
/// # });
/// ```
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Check that the backend is usable.
    async fn has_connection(&self) -> SessionResult<bool>;

    /// Read the payload of a session.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session ID to read
    async fn read(&self, session_id: &str) -> SessionResult<String>;

    /// Persist the payload of a session.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session ID to write
    /// * `data` - The serialized payload
    async fn write(&self, session_id: &str, data: &str) -> SessionResult<bool>;

    /// Remove a session (logout).
    ///
    /// # Arguments
    ///
    /// * `session_id` - The session ID to remove
    async fn destroy(&self, session_id: &str) -> SessionResult<bool>;

    /// Garbage-collect expired sessions.
    ///
    /// # Arguments
    ///
    /// * `max_lifetime` - Lifetime hint; backends with stored expiry may ignore it
    async fn gc(&self, max_lifetime: Duration) -> SessionResult<bool>;
}

/// Generate a new unique session ID.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_session_id() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
