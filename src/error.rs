//! Error taxonomy for the game-state engine
//!
//! Only `Contention` is ever retried (by the store, with backoff). Everything
//! else propagates to the caller untouched.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    /// Malformed action input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A fold hit a missing or contradictory dependency.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// An append arrived before the event it causally depends on.
    #[error("ordering error: {0}")]
    Ordering(String),

    /// The store stayed locked through the whole retry budget.
    #[error("store contention: gave up after {attempts} attempt(s)")]
    Contention { attempts: u32 },

    /// A resolution argument fell outside its declared range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GameError>;

impl GameError {
    /// True for transient lock conflicts reported by SQLite.
    pub fn is_contention(&self) -> bool {
        match self {
            GameError::Contention { .. } => true,
            GameError::Storage(err) => is_busy(err),
            _ => false,
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, the only storage errors worth retrying
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_classification() {
        assert!(GameError::Contention { attempts: 3 }.is_contention());
        assert!(!GameError::Validation("bad".into()).is_contention());

        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(GameError::Storage(busy).is_contention());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(!GameError::Storage(constraint).is_contention());
    }

    #[test]
    fn test_error_messages() {
        let err = GameError::Contention { attempts: 5 };
        assert_eq!(err.to_string(), "store contention: gave up after 5 attempt(s)");

        let err = GameError::Ordering("expedition:x missing".into());
        assert!(err.to_string().starts_with("ordering error"));
    }
}
