//! Pooled connection wrapper and collaborator callbacks
//!
//! The pool never touches wire bytes. The caller supplies three
//! collaborators, either as individual closures on
//! [`PoolConfig`](crate::config::PoolConfig) or bundled in a
//! [`ConnectionManager`] implementation:
//!
//! - **creator**: produces a raw connection value, honoring cancellation
//! - **closer**: best-effort release, always run on its own task
//! - **validator**: pure, fast liveness test

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// Asynchronous connection factory callback.
///
/// The [`CancellationToken`] is a child of the pool's close token and is
/// cancelled when the connect deadline elapses; implementations should abort
/// in-flight I/O when it fires. A success reported after cancellation is
/// still accepted and enters the pool.
pub type Creator<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, std::result::Result<T, BoxError>> + Send + Sync>;

/// Asynchronous connection release callback. Best-effort; never blocks pool
/// internals because the pool always dispatches it to a separate task.
pub type Closer<T> = Arc<dyn Fn(PooledConn<T>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Synchronous liveness test. Must be pure and fast; returning `false` marks
/// the connection for retirement.
pub type Validator<T> = Arc<dyn Fn(&PooledConn<T>) -> bool + Send + Sync>;

/// A connection managed by the pool.
///
/// Wraps the user value together with its creation and last-return
/// timestamps. Obtained from [`Pool::get`](crate::pool::Pool::get) and given
/// back via [`Pool::put`](crate::pool::Pool::put).
pub struct PooledConn<T> {
    value: T,
    created_at: Instant,
    last_returned_at: Option<Instant>,
}

impl<T> PooledConn<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            last_returned_at: None,
        }
    }

    /// Borrow the underlying user value
    pub fn inner(&self) -> &T {
        &self.value
    }

    /// Mutably borrow the underlying user value
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// When this connection was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since this connection was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// How long this connection has been sitting idle in the pool.
    ///
    /// `None` while checked out (or before the first return).
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_returned_at.map(|t| t.elapsed())
    }

    /// Stamp the return time; called on every path that parks the
    /// connection in the idle store.
    pub(crate) fn mark_returned(&mut self) {
        self.last_returned_at = Some(Instant::now());
    }

    /// Clear the return time; called on every path that hands the
    /// connection to a caller.
    pub(crate) fn mark_taken(&mut self) {
        self.last_returned_at = None;
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PooledConn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("value", &self.value)
            .field("age", &self.age())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

/// Bundled collaborator callbacks.
///
/// A convenience seam for callers that prefer one implementation over three
/// closures; [`PoolConfig::with_manager`](crate::config::PoolConfig::with_manager)
/// wires all three hooks from it.
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// The raw connection type produced by [`create`](Self::create)
    type Connection: Send + 'static;

    /// Establish a new connection. Must honor `cancel`; a late success is
    /// still accepted by the pool.
    async fn create(
        &self,
        cancel: CancellationToken,
    ) -> std::result::Result<Self::Connection, BoxError>;

    /// Release a connection. Errors are swallowed by design.
    async fn close(&self, conn: PooledConn<Self::Connection>);

    /// Test connection liveness. Defaults to always-alive.
    fn validate(&self, _conn: &PooledConn<Self::Connection>) -> bool {
        true
    }
}
