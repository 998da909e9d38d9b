//! Error types for tidepool
//!
//! Callers of [`Pool::get`](crate::pool::Pool::get) observe exactly one of
//! `PoolClosed`, `WaitTimeout`, or `MaxWaitLimit` besides a successful
//! checkout. Creation failures are absorbed by the background replenisher and
//! only surface from `Pool::new` when `wait_first_conn` is set.

use thiserror::Error;

/// Result type for tidepool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied creators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for tidepool
#[derive(Error, Debug)]
pub enum Error {
    /// The active-connection limit has been reached.
    ///
    /// Reserved for API stability: saturation is currently reported through
    /// the wait path (`WaitTimeout`) rather than eagerly.
    #[error("active connection limit reached")]
    MaxActiveLimit,

    /// The queue of callers waiting for admission is full
    #[error("wait queue limit reached")]
    MaxWaitLimit,

    /// The pool has been closed
    #[error("pool is closed")]
    PoolClosed,

    /// The wait deadline elapsed before a connection became available
    #[error("timed out waiting for a connection")]
    WaitTimeout,

    /// A creator invocation failed (internal; surfaced only during
    /// `wait_first_conn` initialization)
    #[error("connection creation failed: {message}")]
    CreateFailure {
        /// Description of the underlying creation failure
        message: String,
    },

    /// The pool configuration is incomplete or invalid
    #[error("configuration error: {message}")]
    Configuration {
        /// What is missing or invalid
        message: String,
    },
}

impl Error {
    /// Create a `CreateFailure` error
    pub fn create(message: impl Into<String>) -> Self {
        Self::CreateFailure {
            message: message.into(),
        }
    }

    /// Create a `Configuration` error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether retrying the operation may succeed without intervention
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::WaitTimeout | Self::MaxWaitLimit | Self::CreateFailure { .. }
        )
    }
}
