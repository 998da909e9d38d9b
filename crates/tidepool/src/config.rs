//! Pool configuration
//!
//! A thin tunables struct with field-level defaults, normalised once by
//! [`Pool::new`](crate::pool::Pool::new). Collaborator callbacks are
//! attached with [`with_creator`](PoolConfig::with_creator) /
//! [`with_closer`](PoolConfig::with_closer) /
//! [`with_validator`](PoolConfig::with_validator), or all at once with
//! [`with_manager`](PoolConfig::with_manager); a configuration missing any
//! of the three is rejected.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::conn::{Closer, ConnectionManager, Creator, PooledConn, Validator};
use crate::error::{BoxError, Error, Result};

const DEF_MIN_IDLE: usize = 2;
const DEF_MAX_ACTIVE: usize = 10;
const DEF_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const DEF_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEF_CHECK_IDLE_INTERVAL: Duration = Duration::from_secs(5);

/// Pool configuration.
///
/// Zero means "unset" for the count fields and "disabled" for
/// `idle_timeout` / `max_conn_lifetime`; `max_active = 0` selects unbounded
/// admission. Unset fields are derived during normalisation, see the field
/// docs for the derived values.
pub struct PoolConfig<T> {
    /// Block `Pool::new` until at least one creation succeeds
    pub wait_first_conn: bool,
    /// Target idle reserve (default 2, floor 1)
    pub min_idle: usize,
    /// Surplus threshold (default `min_idle * 2`, raised when below
    /// `min_idle`)
    pub max_idle: usize,
    /// Concurrent checkout cap; 0 means unbounded (default 10)
    pub max_active: usize,
    /// Upper bound on one replenish batch (default `min_idle`, clamped to
    /// `[1, max_idle]`)
    pub batch_increment: usize,
    /// Upper bound on closures per maintenance tick (default
    /// `batch_increment`)
    pub batch_shrink: usize,
    /// Maximum idle duration; zero disables (default disabled)
    pub idle_timeout: Duration,
    /// Maximum wait for a checkout after enqueue (default 5 s)
    pub wait_timeout: Duration,
    /// Cap on waiters without admission credit; 0 means unlimited
    pub max_wait_conn_count: usize,
    /// Deadline for one creator invocation (default 5 s)
    pub connect_timeout: Duration,
    /// Maximum connection age; zero disables (default disabled)
    pub max_conn_lifetime: Duration,
    /// Maintainer period (default 5 s)
    pub check_idle_interval: Duration,

    creator: Option<Creator<T>>,
    closer: Option<Closer<T>>,
    validator: Option<Validator<T>>,
}

impl<T> Default for PoolConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PoolConfig<T> {
    /// Create a configuration with default tunables and no callbacks
    pub fn new() -> Self {
        Self {
            wait_first_conn: false,
            min_idle: DEF_MIN_IDLE,
            max_idle: DEF_MIN_IDLE * 2,
            max_active: DEF_MAX_ACTIVE,
            batch_increment: 0,
            batch_shrink: 0,
            idle_timeout: Duration::ZERO,
            wait_timeout: DEF_WAIT_TIMEOUT,
            max_wait_conn_count: 0,
            connect_timeout: DEF_CONNECT_TIMEOUT,
            max_conn_lifetime: Duration::ZERO,
            check_idle_interval: DEF_CHECK_IDLE_INTERVAL,
            creator: None,
            closer: None,
            validator: None,
        }
    }

    /// Block `Pool::new` until the first creation succeeds
    pub fn with_wait_first_conn(mut self, wait: bool) -> Self {
        self.wait_first_conn = wait;
        self
    }

    /// Set the target idle reserve
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the surplus threshold
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Set the concurrent checkout cap; 0 means unbounded
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the upper bound on one replenish batch
    pub fn with_batch_increment(mut self, batch_increment: usize) -> Self {
        self.batch_increment = batch_increment;
        self
    }

    /// Set the upper bound on closures per maintenance tick
    pub fn with_batch_shrink(mut self, batch_shrink: usize) -> Self {
        self.batch_shrink = batch_shrink;
        self
    }

    /// Set the maximum idle duration; zero disables
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the maximum wait for a checkout
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Set the cap on waiters without admission credit; 0 means unlimited
    pub fn with_max_wait_conn_count(mut self, count: usize) -> Self {
        self.max_wait_conn_count = count;
        self
    }

    /// Set the deadline for one creator invocation
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set the maximum connection age; zero disables
    pub fn with_max_conn_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_conn_lifetime = lifetime;
        self
    }

    /// Set the maintainer period
    pub fn with_check_idle_interval(mut self, interval: Duration) -> Self {
        self.check_idle_interval = interval;
        self
    }

    /// Set the connection factory callback
    pub fn with_creator<F, Fut>(mut self, creator: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        self.creator = Some(Arc::new(move |cancel| {
            let fut: BoxFuture<'static, std::result::Result<T, BoxError>> =
                Box::pin(creator(cancel));
            fut
        }));
        self
    }

    /// Set the connection release callback
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: Fn(PooledConn<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.closer = Some(Arc::new(move |conn| {
            let fut: BoxFuture<'static, ()> = Box::pin(closer(conn));
            fut
        }));
        self
    }

    /// Set the connection liveness callback
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&PooledConn<T>) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Wire all three callbacks from one [`ConnectionManager`]
    pub fn with_manager<M>(self, manager: Arc<M>) -> Self
    where
        M: ConnectionManager<Connection = T>,
        T: Send + 'static,
    {
        let create_mgr = Arc::clone(&manager);
        let close_mgr = Arc::clone(&manager);
        let validate_mgr = manager;
        self.with_creator(move |cancel| {
            let manager = Arc::clone(&create_mgr);
            async move { manager.create(cancel).await }
        })
        .with_closer(move |conn| {
            let manager = Arc::clone(&close_mgr);
            async move { manager.close(conn).await }
        })
        .with_validator(move |conn| validate_mgr.validate(conn))
    }

    /// Apply defaults and floors. Idempotent.
    pub(crate) fn normalize(&mut self) {
        if self.min_idle < 1 {
            self.min_idle = DEF_MIN_IDLE;
        }
        if self.max_idle < 1 || self.max_idle < self.min_idle {
            self.max_idle = self.min_idle * 2;
        }
        if self.batch_increment < 1 {
            self.batch_increment = self.min_idle;
        }
        if self.batch_increment > self.max_idle {
            self.batch_increment = self.max_idle;
        }
        if self.batch_shrink < 1 {
            self.batch_shrink = self.batch_increment;
        }
        if self.wait_timeout.is_zero() {
            self.wait_timeout = DEF_WAIT_TIMEOUT;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEF_CONNECT_TIMEOUT;
        }
        if self.check_idle_interval.is_zero() {
            self.check_idle_interval = DEF_CHECK_IDLE_INTERVAL;
        }
    }

    /// Normalise and split off the callbacks, rejecting an incomplete
    /// configuration.
    pub(crate) fn finalize(mut self) -> Result<(Self, Hooks<T>)> {
        self.normalize();
        let creator = self
            .creator
            .clone()
            .ok_or_else(|| Error::config("missing creator"))?;
        let closer = self
            .closer
            .clone()
            .ok_or_else(|| Error::config("missing closer"))?;
        let validator = self
            .validator
            .clone()
            .ok_or_else(|| Error::config("missing validator"))?;
        Ok((
            self,
            Hooks {
                creator,
                closer,
                validator,
            },
        ))
    }

    /// Whether admission is bounded
    pub(crate) fn is_bounded(&self) -> bool {
        self.max_active >= 1
    }
}

impl<T> Clone for PoolConfig<T> {
    fn clone(&self) -> Self {
        Self {
            wait_first_conn: self.wait_first_conn,
            min_idle: self.min_idle,
            max_idle: self.max_idle,
            max_active: self.max_active,
            batch_increment: self.batch_increment,
            batch_shrink: self.batch_shrink,
            idle_timeout: self.idle_timeout,
            wait_timeout: self.wait_timeout,
            max_wait_conn_count: self.max_wait_conn_count,
            connect_timeout: self.connect_timeout,
            max_conn_lifetime: self.max_conn_lifetime,
            check_idle_interval: self.check_idle_interval,
            creator: self.creator.clone(),
            closer: self.closer.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("wait_first_conn", &self.wait_first_conn)
            .field("min_idle", &self.min_idle)
            .field("max_idle", &self.max_idle)
            .field("max_active", &self.max_active)
            .field("batch_increment", &self.batch_increment)
            .field("batch_shrink", &self.batch_shrink)
            .field("idle_timeout", &self.idle_timeout)
            .field("wait_timeout", &self.wait_timeout)
            .field("max_wait_conn_count", &self.max_wait_conn_count)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .field("check_idle_interval", &self.check_idle_interval)
            .field("creator", &self.creator.is_some())
            .field("closer", &self.closer.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Validated callback set, split out of the configuration at pool
/// construction.
pub(crate) struct Hooks<T> {
    pub(crate) creator: Creator<T>,
    pub(crate) closer: Closer<T>,
    pub(crate) validator: Validator<T>,
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_after_normalize() {
        let mut config: PoolConfig<u32> = PoolConfig::new();
        config.normalize();

        assert_eq!(config.min_idle, 2);
        assert_eq!(config.max_idle, 4);
        assert_eq!(config.max_active, 10);
        assert_eq!(config.batch_increment, 2);
        assert_eq!(config.batch_shrink, 2);
        assert_eq!(config.idle_timeout, Duration::ZERO);
        assert_eq!(config.wait_timeout, Duration::from_secs(5));
        assert_eq!(config.max_wait_conn_count, 0);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.max_conn_lifetime, Duration::ZERO);
        assert_eq!(config.check_idle_interval, Duration::from_secs(5));
        assert!(!config.wait_first_conn);
    }

    #[test]
    fn test_normalize_floors() {
        let mut config: PoolConfig<u32> = PoolConfig::new()
            .with_min_idle(0)
            .with_max_idle(0)
            .with_wait_timeout(Duration::ZERO)
            .with_connect_timeout(Duration::ZERO)
            .with_check_idle_interval(Duration::ZERO);
        config.normalize();

        assert_eq!(config.min_idle, 2);
        assert_eq!(config.max_idle, 4);
        assert_eq!(config.wait_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.check_idle_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_max_idle_raised_above_min_idle() {
        let mut config: PoolConfig<u32> = PoolConfig::new().with_min_idle(5).with_max_idle(3);
        config.normalize();
        assert_eq!(config.max_idle, 10);
    }

    #[test]
    fn test_batch_increment_clamped_to_max_idle() {
        let mut config: PoolConfig<u32> = PoolConfig::new()
            .with_min_idle(2)
            .with_max_idle(3)
            .with_batch_increment(9);
        config.normalize();
        assert_eq!(config.batch_increment, 3);
        assert_eq!(config.batch_shrink, 3);
    }

    #[test]
    fn test_unbounded_mode() {
        let config: PoolConfig<u32> = PoolConfig::new().with_max_active(0);
        assert!(!config.is_bounded());
        assert!(PoolConfig::<u32>::new().is_bounded());
    }

    #[test]
    fn test_finalize_rejects_missing_hooks() {
        let err = PoolConfig::<u32>::new().finalize().unwrap_err();
        assert!(err.to_string().contains("missing creator"));

        let err = PoolConfig::<u32>::new()
            .with_creator(|_| async { Ok(0) })
            .finalize()
            .unwrap_err();
        assert!(err.to_string().contains("missing closer"));

        let err = PoolConfig::<u32>::new()
            .with_creator(|_| async { Ok(0) })
            .with_closer(|_conn| async {})
            .finalize()
            .unwrap_err();
        assert!(err.to_string().contains("missing validator"));

        assert!(PoolConfig::<u32>::new()
            .with_creator(|_| async { Ok(0) })
            .with_closer(|_conn| async {})
            .with_validator(|_conn| true)
            .finalize()
            .is_ok());
    }
}
