//! Session configuration.

use crate::error::{SessionError, SessionResult};
use crate::retry::RetryPolicy;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Lock counter value at which a held lock is presumed abandoned.
pub const DEFAULT_BREAK_AFTER: i64 = 15;

/// Lock acquisition attempts before a read gives up.
pub const DEFAULT_FAIL_AFTER: u32 = 20;

/// Collection holding one document per session.
pub const DEFAULT_COLLECTION: &str = "sessions";

/// Schemes that select the MongoDB backend.
const MONGO_SCHEMES: [&str; 3] = ["mongodb://", "mongodb+srv://", "mongo://"];

/// Identity of this process, stamped into `owner` when a lock is taken.
static PROCESS_TOKEN: Lazy<String> =
    Lazy::new(|| format!("{}-{}", std::process::id(), uuid::Uuid::new_v4().simple()));

/// Get the owner token shared by every store in this process.
pub fn process_owner_token() -> String {
    PROCESS_TOKEN.clone()
}

/// Session backend selected by the connection descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionBackend {
    /// MongoDB backend
    Mongo {
        /// URI handed to the driver
        uri: String,
        /// Logical database holding the sessions collection
        database: String,
    },
    /// Default (fallback) backend
    Fallback,
}

impl SessionBackend {
    /// Parse a connection descriptor.
    ///
    /// Anything without a MongoDB scheme selects the fallback backend. A MongoDB
    /// descriptor must name a database in its path.
    ///
    /// # Examples
    ///
    /// ```
    /// use armature_mongo_session::SessionBackend;
    ///
    /// let backend = SessionBackend::parse("mongo://db1,db2:27017/shop").unwrap();
    /// assert_eq!(
    ///     backend,
    ///     SessionBackend::Mongo {
    ///         uri: "mongodb://db1,db2:27017/shop".to_string(),
    ///         database: "shop".to_string(),
    ///     }
    /// );
    ///
    /// assert_eq!(SessionBackend::parse("/var/lib/sessions").unwrap(), SessionBackend::Fallback);
    /// assert!(SessionBackend::parse("mongodb://localhost:27017").is_err());
    /// ```
    pub fn parse(descriptor: &str) -> SessionResult<Self> {
        let descriptor = descriptor.trim();
        let Some(scheme) = MONGO_SCHEMES.iter().find(|s| descriptor.starts_with(**s)) else {
            return Ok(Self::Fallback);
        };

        let rest = &descriptor[scheme.len()..];
        let without_query = rest.split('?').next().unwrap_or_default();
        let database = match without_query.split_once('/') {
            Some((_, path)) => path.rsplit('/').next().unwrap_or_default(),
            None => "",
        };

        if database.is_empty() {
            return Err(SessionError::Config(
                "Mongo server string must specify db name".to_string(),
            ));
        }

        let uri = if *scheme == "mongo://" {
            format!("mongodb://{}", rest)
        } else {
            descriptor.to_string()
        };

        Ok(Self::Mongo {
            uri,
            database: database.to_string(),
        })
    }

    /// Whether this backend uses the remote document store.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Mongo { .. })
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection descriptor (session save path)
    pub save_path: String,
    /// Session lifetime, refreshed on every lock acquisition
    pub lifetime: Duration,
    /// Garbage collection runs with probability 1/factor (0 disables it)
    pub cleaning_factor: u32,
    /// Lock counter value that force-acquires an abandoned lock
    pub break_after: i64,
    /// Lock acquisition attempts before a read gives up
    pub fail_after: u32,
    /// Sleep between lock acquisition attempts
    pub retry_delay: Duration,
    /// Collection name
    pub collection: String,
    /// Owner token identifying this lock holder
    pub owner: String,
    /// Connect and server selection timeout
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            lifetime: Duration::from_secs(1440),
            cleaning_factor: 1,
            break_after: DEFAULT_BREAK_AFTER,
            fail_after: DEFAULT_FAIL_AFTER,
            retry_delay: Duration::from_secs(1),
            collection: DEFAULT_COLLECTION.to_string(),
            owner: process_owner_token(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Create a configuration for the given connection descriptor.
    ///
    /// # Examples
    ///
    /// ```
    /// use armature_mongo_session::SessionConfig;
    /// use std::time::Duration;
    ///
    /// let config = SessionConfig::new("mongodb://localhost:27017/app")
    ///     .with_lifetime(Duration::from_secs(3600))
    ///     .with_cleaning_factor(100);
    /// assert!(config.backend().unwrap().is_remote());
    /// ```
    pub fn new(save_path: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SESSION_SAVE_PATH") {
            config.save_path = path;
        }

        if let Ok(secs) = std::env::var("SESSION_LIFETIME")
            && let Ok(secs) = secs.parse() {
                config.lifetime = Duration::from_secs(secs);
            }

        if let Ok(factor) = std::env::var("SESSION_CLEANING_FACTOR")
            && let Ok(factor) = factor.parse() {
                config.cleaning_factor = factor;
            }

        if let Ok(value) = std::env::var("SESSION_BREAK_AFTER")
            && let Ok(value) = value.parse() {
                config.break_after = value;
            }

        if let Ok(value) = std::env::var("SESSION_FAIL_AFTER")
            && let Ok(value) = value.parse() {
                config.fail_after = value;
            }

        if let Ok(secs) = std::env::var("SESSION_CONNECT_TIMEOUT")
            && let Ok(secs) = secs.parse() {
                config.connect_timeout = Duration::from_secs(secs);
            }

        config
    }

    /// Parse the descriptor into a backend.
    pub fn backend(&self) -> SessionResult<SessionBackend> {
        SessionBackend::parse(&self.save_path)
    }

    /// Set the session lifetime.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the garbage collection cleaning factor.
    pub fn with_cleaning_factor(mut self, factor: u32) -> Self {
        self.cleaning_factor = factor;
        self
    }

    /// Set the lock break threshold.
    pub fn with_break_after(mut self, break_after: i64) -> Self {
        self.break_after = break_after;
        self
    }

    /// Set the attempt limit for lock acquisition.
    pub fn with_fail_after(mut self, fail_after: u32) -> Self {
        self.fail_after = fail_after;
        self
    }

    /// Set the sleep between lock acquisition attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the collection name.
    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    /// Set the owner token.
    ///
    /// Stores sharing a token can write each other's locked sessions.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Retry policy for lock acquisition.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fail_after, self.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.break_after, 15);
        assert_eq!(config.fail_after, 20);
        assert_eq!(config.collection, "sessions");
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.backend().unwrap(), SessionBackend::Fallback);
    }

    #[test]
    fn test_parse_mongodb_uri() {
        let backend = SessionBackend::parse("mongodb://user:pw@localhost:27017/app?w=1").unwrap();
        assert_eq!(
            backend,
            SessionBackend::Mongo {
                uri: "mongodb://user:pw@localhost:27017/app?w=1".to_string(),
                database: "app".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_srv_uri() {
        let backend = SessionBackend::parse("mongodb+srv://cluster.example.net/sessions").unwrap();
        assert!(backend.is_remote());
    }

    #[test]
    fn test_parse_legacy_scheme_is_rewritten() {
        match SessionBackend::parse("mongo://localhost/shop").unwrap() {
            SessionBackend::Mongo { uri, database } => {
                assert_eq!(uri, "mongodb://localhost/shop");
                assert_eq!(database, "shop");
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_database() {
        for descriptor in ["mongodb://localhost", "mongodb://localhost/", "mongodb://localhost/?w=1"] {
            let err = SessionBackend::parse(descriptor).unwrap_err();
            assert!(matches!(err, SessionError::Config(_)), "{}", descriptor);
        }
    }

    #[test]
    fn test_parse_other_descriptors_fall_back() {
        for descriptor in ["", "/var/lib/php/sessions", "redis://localhost:6379", "files"] {
            assert_eq!(SessionBackend::parse(descriptor).unwrap(), SessionBackend::Fallback);
        }
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new("mongodb://localhost/app")
            .with_lifetime(Duration::from_secs(60))
            .with_cleaning_factor(0)
            .with_break_after(5)
            .with_fail_after(8)
            .with_retry_delay(Duration::from_millis(50))
            .with_collection("web_sessions")
            .with_owner("worker-1");

        assert_eq!(config.lifetime, Duration::from_secs(60));
        assert_eq!(config.cleaning_factor, 0);
        assert_eq!(config.break_after, 5);
        assert_eq!(config.collection, "web_sessions");
        assert_eq!(config.owner, "worker-1");

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 8);
        assert_eq!(policy.delay, Duration::from_millis(50));
    }

    #[test]
    fn test_from_env() {
        // SAFETY: no other test reads or writes these variables
        unsafe {
            std::env::set_var("SESSION_SAVE_PATH", "mongodb://db.internal/shop");
            std::env::set_var("SESSION_LIFETIME", "60");
            std::env::set_var("SESSION_FAIL_AFTER", "not-a-number");
        }

        let config = SessionConfig::from_env();

        unsafe {
            std::env::remove_var("SESSION_SAVE_PATH");
            std::env::remove_var("SESSION_LIFETIME");
            std::env::remove_var("SESSION_FAIL_AFTER");
        }

        assert_eq!(config.save_path, "mongodb://db.internal/shop");
        assert_eq!(config.lifetime, Duration::from_secs(60));
        assert_eq!(config.fail_after, DEFAULT_FAIL_AFTER);
    }

    #[test]
    fn test_process_owner_token_is_stable() {
        assert_eq!(process_owner_token(), process_owner_token());
        assert!(process_owner_token().starts_with(&format!("{}-", std::process::id())));
    }
}
