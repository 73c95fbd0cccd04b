//! MongoDB session handler with per-session locking for Armature.
//!
//! Concurrent requests for the same session id are serialised through a lock
//! counter kept in the session document itself, so two requests never
//! interleave their writes:
//!
//! 1. `read` atomically increments the counter. A result of 1 means the lock
//!    was free; a result equal to `break_after` means the previous holder is
//!    presumed dead and the lock is taken over. Otherwise the reader sleeps and
//!    retries, giving up with an empty payload after `fail_after` attempts.
//! 2. The winner stamps its owner token and refreshes `expires`.
//! 3. `write` only applies while the stored owner still matches, and resets
//!    the counter to 0.
//!
//! Failures degrade instead of propagating: an unreachable server switches
//! the store to the fallback handler for good, and a failed command yields an
//! empty session.
//!
//! # Features
//!
//! - `mongodb` - MongoDB document store (enabled by default)
//!
//! # Examples
//!
//! ```no_run
//! use armature_mongo_session::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = SessionConfig::new("mongodb://localhost:27017/shop")
//!         .with_lifetime(Duration::from_secs(3600))
//!         .with_cleaning_factor(100);
//!
//!     let handler = open_session_handler(&config, Arc::new(MemorySessionHandler::new()));
//!     handler.has_connection().await?;
//!
//!     // Blocks other requests for this id until written back
//!     let data = handler.read("abc").await?;
//!     handler.write("abc", &format!("{data}visits=1;")).await?;
//!
//!     handler.gc(config.lifetime).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fallback;
pub mod handler;
pub mod record;
pub mod retry;
pub mod store;
pub mod stores;

pub use config::{SessionBackend, SessionConfig, process_owner_token};
pub use error::{SessionError, SessionResult};
pub use fallback::{MemorySessionHandler, open_session_handler};
pub use handler::{SessionHandler, generate_session_id};
pub use record::{LockSnapshot, LockState, SessionRecord};
pub use store::LockingSessionStore;
pub use stores::{DocumentStore, MemoryDocumentStore};

#[cfg(feature = "mongodb")]
pub use stores::MongoDocumentStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{SessionBackend, SessionConfig};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::fallback::{MemorySessionHandler, open_session_handler};
    pub use crate::handler::SessionHandler;
    pub use crate::store::LockingSessionStore;
    pub use crate::stores::{DocumentStore, MemoryDocumentStore};

    #[cfg(feature = "mongodb")]
    pub use crate::stores::MongoDocumentStore;
}
