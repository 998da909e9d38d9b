//! Pool facade
//!
//! `Pool` orchestrates the idle store, the admission gate, the wait
//! registry, and the background replenisher/maintainer under one mutex.
//! Critical sections are short and never await; connections are handed to
//! waiters over single-shot channels and closers always run on their own
//! tasks.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::{Hooks, PoolConfig};
use crate::conn::PooledConn;
use crate::error::{Error, Result};
use crate::idle::IdleStore;
use crate::maintain;
use crate::replenish;
use crate::wait::{Removed, WaitRegistry, Waiter};

/// Point-in-time snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections parked in the idle store
    pub idle: usize,
    /// Connections currently checked out
    pub active: usize,
    /// In-flight creator invocations
    pub connecting: usize,
    /// Callers queued without admission credit
    pub waiters: usize,
    /// Callers queued holding admission credit
    pub credited_waiters: usize,
}

/// Outcome of [`Shared::try_admit`]: either a connection in hand, or a
/// registered waiter (and whether the caller should kick the replenisher
/// before suspending).
pub(crate) enum Admission<T> {
    Ready(PooledConn<T>),
    Waiting { waiter: Waiter<T>, replenish: bool },
}

/// Mutable pool state; every field is only touched under the pool mutex.
pub(crate) struct PoolState<T> {
    pub(crate) idle: IdleStore<T>,
    pub(crate) registry: WaitRegistry<T>,
    pub(crate) active_num: usize,
    pub(crate) connecting: usize,
}

/// State shared between the facade and background tasks.
pub(crate) struct Shared<T: Send + 'static> {
    pub(crate) config: PoolConfig<T>,
    pub(crate) hooks: Hooks<T>,
    pub(crate) state: Mutex<PoolState<T>>,
    /// Admission gate; `None` when `max_active` is unbounded
    pub(crate) gate: Option<Semaphore>,
    pub(crate) close: CancellationToken,
}

impl<T: Send + 'static> Shared<T> {
    pub(crate) fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Full liveness check: user validator, then age, then idle duration.
    pub(crate) fn validate(&self, conn: &PooledConn<T>) -> bool {
        if !(self.hooks.validator)(conn) {
            return false;
        }
        if !self.config.max_conn_lifetime.is_zero() && conn.age() >= self.config.max_conn_lifetime
        {
            return false;
        }
        if !self.config.idle_timeout.is_zero() {
            if let Some(idle_for) = conn.idle_for() {
                if idle_for >= self.config.idle_timeout {
                    return false;
                }
            }
        }
        true
    }

    /// Run the closer on its own task so it can never stall pool internals.
    pub(crate) fn spawn_close(&self, conn: PooledConn<T>) {
        let fut = (self.hooks.closer)(conn);
        tokio::spawn(fut);
    }

    /// Pop the newest valid idle connection, retiring invalid ones along the
    /// way. Returns it already stamped as checked out.
    pub(crate) fn pop_valid_idle(&self, state: &mut PoolState<T>) -> Option<PooledConn<T>> {
        while let Some(mut conn) = state.idle.pop_newest() {
            if self.validate(&conn) {
                conn.mark_taken();
                return Some(conn);
            }
            trace!("retiring invalid idle connection");
            self.spawn_close(conn);
        }
        None
    }

    /// Synchronous half of [`Pool::get`](crate::pool::Pool::get): acquire
    /// admission, then either hand back an idle connection or register a
    /// waiter. Kept out of the async path so the mutex guard never needs to
    /// be part of the `get` future's state.
    pub(crate) fn try_admit(&self) -> Result<Admission<T>> {
        let mut state = self.state.lock();
        if let Some(gate) = &self.gate {
            match gate.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    // No admission credit free: queue without credit.
                    let waiter = state
                        .registry
                        .add_waiter(false, self.config.max_wait_conn_count)?;
                    return Ok(Admission::Waiting {
                        waiter,
                        replenish: false,
                    });
                }
            }
        }
        if let Some(conn) = self.pop_valid_idle(&mut state) {
            state.active_num += 1;
            return Ok(Admission::Ready(conn));
        }
        // Credit in hand but no supply: queue holding the credit.
        let waiter = state
            .registry
            .add_waiter(true, self.config.max_wait_conn_count)?;
        Ok(Admission::Waiting {
            waiter,
            replenish: true,
        })
    }

    /// Return a freed admission credit to circulation.
    pub(crate) fn put_credit(&self, state: &mut PoolState<T>) {
        state.registry.put_credit(self.gate.as_ref());
    }

    /// Hand idle supply to credited waiters until one side runs dry.
    ///
    /// Invariant: the idle store and the credited queue are never both
    /// non-empty once the mutex is released.
    pub(crate) fn hand_idle_to_waiters(&self, state: &mut PoolState<T>) {
        while state.registry.credited_len() > 0 && !state.idle.is_empty() {
            match self.pop_valid_idle(state) {
                Some(conn) => {
                    if let Some(mut back) = state.registry.deliver(self.gate.as_ref(), conn) {
                        back.mark_returned();
                        state.idle.push_newest(back);
                        break;
                    }
                }
                None => break,
            }
        }
    }

    /// The put path taken by background creation: deliver to a waiter, else
    /// park at the oldest end of the idle store.
    pub(crate) fn auto_put(&self, conn: PooledConn<T>) {
        let mut state = self.state.lock();
        self.auto_put_locked(&mut state, conn);
    }

    fn auto_put_locked(&self, state: &mut PoolState<T>, conn: PooledConn<T>) {
        if self.is_closed() || !self.validate(&conn) {
            self.spawn_close(conn);
            return;
        }
        if let Some(mut conn) = state.registry.deliver(self.gate.as_ref(), conn) {
            conn.mark_returned();
            state.idle.push_oldest(conn);
        }
    }

    /// Suspend until a connection is handed over, the pool closes, or the
    /// wait deadline fires.
    pub(crate) async fn wait_for_conn(
        &self,
        waiter: Waiter<T>,
        wait: Duration,
    ) -> Result<PooledConn<T>> {
        let Waiter { id, rx } = waiter;
        let mut guard = WaitGuard {
            shared: self,
            id,
            rx,
            armed: true,
        };

        let outcome = tokio::select! {
            _ = self.close.cancelled() => WaitOutcome::Closed,
            _ = tokio::time::sleep(wait) => WaitOutcome::TimedOut,
            res = &mut guard.rx => WaitOutcome::Received(res),
        };
        guard.armed = false;

        match outcome {
            WaitOutcome::Received(Ok(conn)) => {
                let mut state = self.state.lock();
                state.active_num += 1;
                drop(state);
                Ok(conn)
            }
            // The sender is dropped without a hand-off only when the pool
            // tears down around us.
            WaitOutcome::Received(Err(_)) => Err(Error::PoolClosed),
            WaitOutcome::Closed => {
                self.abandon_waiter(id, &mut guard.rx);
                Err(Error::PoolClosed)
            }
            WaitOutcome::TimedOut => {
                self.abandon_waiter(id, &mut guard.rx);
                Err(Error::WaitTimeout)
            }
        }
    }

    /// Reconcile a waiter that is giving up (deadline, close, or a cancelled
    /// `get` future).
    ///
    /// A hand-off may have landed between the wake-up and this lock
    /// acquisition; such a connection is rescued and rerouted, and the
    /// credit it carried goes back into circulation. Otherwise the waiter is
    /// detached from its queue and any held credit returned.
    fn abandon_waiter(&self, id: u64, rx: &mut oneshot::Receiver<PooledConn<T>>) {
        let mut state = self.state.lock();
        match rx.try_recv() {
            Ok(conn) => {
                self.put_credit(&mut state);
                self.auto_put_locked(&mut state, conn);
            }
            Err(_) => match state.registry.remove(id) {
                Removed::Credited => self.put_credit(&mut state),
                Removed::Plain | Removed::NotFound => {}
            },
        }
        self.hand_idle_to_waiters(&mut state);
    }

    /// Retire idle connections that fail validation. Skipped entirely when
    /// both age-based checks are disabled, matching checkout-time
    /// validation semantics.
    pub(crate) fn sweep_invalid(&self) {
        if self.config.idle_timeout.is_zero() && self.config.max_conn_lifetime.is_zero() {
            return;
        }
        let removed = {
            let mut state = self.state.lock();
            state.idle.drain_invalid(|conn| self.validate(conn))
        };
        if !removed.is_empty() {
            debug!(count = removed.len(), "retiring stale idle connections");
            for conn in removed {
                self.spawn_close(conn);
            }
        }
    }

    /// Close surplus idle connections, oldest first, bounded per tick.
    pub(crate) fn shrink_surplus(&self) {
        let removed = {
            let mut state = self.state.lock();
            let mut removed = Vec::new();
            while state.idle.len() > self.config.max_idle && removed.len() < self.config.batch_shrink
            {
                match state.idle.pop_oldest() {
                    Some(conn) => removed.push(conn),
                    None => break,
                }
            }
            removed
        };
        if !removed.is_empty() {
            debug!(count = removed.len(), "shrinking surplus idle connections");
            for conn in removed {
                self.spawn_close(conn);
            }
        }
    }
}

enum WaitOutcome<T> {
    Closed,
    TimedOut,
    Received(std::result::Result<PooledConn<T>, oneshot::error::RecvError>),
}

/// Cleans up a registered waiter if its `get` future is dropped mid-wait.
struct WaitGuard<'a, T: Send + 'static> {
    shared: &'a Shared<T>,
    id: u64,
    rx: oneshot::Receiver<PooledConn<T>>,
    armed: bool,
}

impl<T: Send + 'static> Drop for WaitGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon_waiter(self.id, &mut self.rx);
        }
    }
}

/// A generic asynchronous connection pool.
///
/// Cheap to clone; all clones share one pool. See the crate docs for an
/// overview and examples.
pub struct Pool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Pool<T> {
    /// Build a pool from a configuration.
    ///
    /// Rejects a configuration missing any of the three callbacks. With
    /// `wait_first_conn` set, blocks until one creation succeeds and
    /// surfaces its failure. Spawns the maintainer task; must be called
    /// within a tokio runtime.
    pub async fn new(config: PoolConfig<T>) -> Result<Self> {
        let (config, hooks) = config.finalize()?;
        let gate = if config.is_bounded() {
            Some(Semaphore::new(config.max_active))
        } else {
            None
        };
        let shared = Arc::new(Shared {
            config,
            hooks,
            state: Mutex::new(PoolState {
                idle: IdleStore::new(),
                registry: WaitRegistry::new(),
                active_num: 0,
                connecting: 0,
            }),
            gate,
            close: CancellationToken::new(),
        });

        if shared.config.wait_first_conn {
            replenish::apply_connect(&shared).await?;
        }

        replenish::replenish_if_needed(&shared);
        maintain::spawn_maintainer(&shared);

        Ok(Self { shared })
    }

    /// Check out a connection, waiting up to the configured `wait_timeout`.
    pub async fn get(&self) -> Result<PooledConn<T>> {
        self.get_inner(None).await
    }

    /// Check out a connection, waiting up to the shorter of `timeout` and
    /// the configured `wait_timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<PooledConn<T>> {
        self.get_inner(Some(timeout)).await
    }

    async fn get_inner(&self, caller_timeout: Option<Duration>) -> Result<PooledConn<T>> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(Error::PoolClosed);
        }
        let wait = match caller_timeout {
            Some(timeout) => timeout.min(shared.config.wait_timeout),
            None => shared.config.wait_timeout,
        };

        match shared.try_admit()? {
            Admission::Ready(conn) => Ok(conn),
            Admission::Waiting { waiter, replenish } => {
                if replenish {
                    replenish::replenish_if_needed(shared);
                }
                shared.wait_for_conn(waiter, wait).await
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Hands it directly to the oldest credited waiter when one exists,
    /// otherwise parks it as the newest idle entry. On a closed pool the
    /// connection is simply closed. Never blocks on user code.
    pub fn put(&self, conn: PooledConn<T>) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        state.active_num = state.active_num.saturating_sub(1);

        if shared.is_closed() {
            drop(state);
            shared.spawn_close(conn);
            return;
        }

        shared.put_credit(&mut state);

        let mut conn = conn;
        while !shared.validate(&conn) {
            trace!("returned connection failed validation; substituting from idle");
            shared.spawn_close(conn);
            match shared.pop_valid_idle(&mut state) {
                Some(next) => conn = next,
                None => {
                    drop(state);
                    replenish::replenish_if_needed(shared);
                    return;
                }
            }
        }

        if let Some(mut conn) = state.registry.deliver(shared.gate.as_ref(), conn) {
            conn.mark_returned();
            state.idle.push_newest(conn);
        }
    }

    /// Close the pool. Idempotent.
    ///
    /// Cancels background work, drains the idle store through the closer,
    /// fails pending waiters with `PoolClosed`, and makes every later
    /// [`get`](Self::get) fail `PoolClosed`.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.close.is_cancelled() {
            return;
        }
        shared.close.cancel();
        debug!("pool closed; draining idle connections");
        let drained = { shared.state.lock().idle.drain() };
        for conn in drained {
            shared.spawn_close(conn);
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Snapshot current occupancy
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            active: state.active_num,
            connecting: state.connecting,
            waiters: state.registry.wait_len(),
            credited_waiters: state.registry.credited_len(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("closed", &self.is_closed())
            .field("status", &status)
            .finish()
    }
}
