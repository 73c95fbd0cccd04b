//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration error (e.g. a descriptor without a database name)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connect, database selection or index creation failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a command at the protocol level
    #[error("Command error: {message} ({code})")]
    Command {
        /// Server supplied message
        message: String,
        /// Server supplied error code, 0 when unknown
        code: i32,
    },

    /// Lock could not be acquired within the attempt limit
    #[error("Lock not acquired after {attempts} attempts")]
    LockTimeout {
        /// Attempts made before giving up
        attempts: u32,
    },
}

impl SessionError {
    /// Build a command error from a message and code.
    pub fn command(message: impl Into<String>, code: i32) -> Self {
        Self::Command {
            message: message.into(),
            code,
        }
    }

    /// Check if this error should disable the remote store.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for SessionError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Command(cmd) => Self::command(cmd.message.clone(), cmd.code),
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => Self::Connection(err.to_string()),
            _ => Self::command(err.to_string(), 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = SessionError::command("WriteConflict", 112);
        assert_eq!(err.to_string(), "Command error: WriteConflict (112)");
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_connection_error_detection() {
        assert!(SessionError::Connection("refused".to_string()).is_connection_error());
        assert!(!SessionError::LockTimeout { attempts: 20 }.is_connection_error());
        assert!(!SessionError::Config("no db".to_string()).is_connection_error());
    }
}
