//! # tidepool
//!
//! A generic asynchronous connection pool: a bounded, reusable cache of
//! user-supplied connection handles (TCP sockets, database sessions, RPC
//! channels) shared across many concurrent callers.
//!
//! ## Features
//!
//! - **Admission limiting**: a bounded gate caps concurrent checkouts at
//!   `max_active`; set it to 0 for unbounded admission
//! - **Direct hand-off**: returned connections bypass the idle store and go
//!   straight to the oldest waiting caller
//! - **Credit-based waiting**: admission credit and connection supply are
//!   tracked as independent resources, so callers queue FIFO for whichever
//!   they lack
//! - **Background replenishment**: a tracked in-flight count keeps an idle
//!   reserve warm without over-provisioning, with backoff on creation
//!   failures
//! - **Stale recycling**: idle-timeout, lifetime, and validator-driven
//!   eviction on a periodic maintenance tick
//! - **Clean cancellation**: timed-out or cancelled waiters leak neither a
//!   connection nor an admission credit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tidepool::prelude::*;
//!
//! let pool = Pool::new(
//!     PoolConfig::new()
//!         .with_min_idle(2)
//!         .with_max_active(10)
//!         .with_wait_timeout(Duration::from_secs(5))
//!         .with_creator(|_cancel| async { TcpStream::connect("db:5432").await.map_err(Into::into) })
//!         .with_closer(|conn| async move { drop(conn) })
//!         .with_validator(|_conn| true),
//! )
//! .await?;
//!
//! let conn = pool.get().await?;
//! // ... use conn.inner() ...
//! pool.put(conn);
//!
//! pool.close();
//! ```
//!
//! The pool never touches wire bytes: the creator, closer, and validator
//! callbacks own the transport. See [`config::PoolConfig`] for every
//! tunable and [`conn::ConnectionManager`] for the bundled-callback seam.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod conn;
pub mod error;
pub mod pool;

mod idle;
mod maintain;
mod replenish;
mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::PoolConfig;
    pub use crate::conn::{Closer, ConnectionManager, Creator, PooledConn, Validator};
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::pool::{Pool, PoolStatus};
}

// Re-export commonly used items at crate root
pub use config::PoolConfig;
pub use conn::PooledConn;
pub use error::{Error, Result};
pub use pool::{Pool, PoolStatus};
