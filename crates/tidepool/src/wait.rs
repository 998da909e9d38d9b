//! Wait registry: the admission/hand-off state machine
//!
//! Admission credit and connection supply are independent resources that can
//! become available in either order, so suspended callers live in one of two
//! FIFO queues:
//!
//! - `wait_list`: callers that hold no credit yet. The head is promoted
//!   whenever a credit is returned, keeping its queue age.
//! - `active_wait_list`: callers that hold a credit and only lack a
//!   connection. Returned connections are handed to the head directly,
//!   bypassing the idle store.
//!
//! Each waiter receives its connection over a single-shot channel. The send
//! side never blocks and the value survives in the channel until the waiter
//! either takes it or reconciles after a timeout, so a hand-off racing a
//! timeout can lose neither the connection nor the credit.

use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::sync::Semaphore;

use crate::conn::PooledConn;
use crate::error::{Error, Result};

/// Caller side of a registered waiter.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    pub(crate) id: u64,
    pub(crate) rx: oneshot::Receiver<PooledConn<T>>,
}

/// Registry side of a registered waiter.
struct WaiterSlot<T> {
    id: u64,
    tx: oneshot::Sender<PooledConn<T>>,
}

/// Which queue a removed waiter occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removed {
    /// Was queued without credit
    Plain,
    /// Was queued holding an admission credit
    Credited,
    /// Already detached (delivered, or never present)
    NotFound,
}

/// The two wait queues. Credit membership is positional: a waiter holds a
/// credit if and only if its slot sits in `active_wait_list`.
pub(crate) struct WaitRegistry<T> {
    next_id: u64,
    wait_list: VecDeque<WaiterSlot<T>>,
    active_wait_list: VecDeque<WaiterSlot<T>>,
}

impl<T> WaitRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            wait_list: VecDeque::new(),
            active_wait_list: VecDeque::new(),
        }
    }

    /// Number of waiters without credit.
    pub(crate) fn wait_len(&self) -> usize {
        self.wait_list.len()
    }

    /// Number of waiters holding credit.
    pub(crate) fn credited_len(&self) -> usize {
        self.active_wait_list.len()
    }

    /// Append a waiter to the matching queue.
    ///
    /// A credit-less enqueue fails with `MaxWaitLimit` once the cap is
    /// reached; credited enqueues are never capped.
    pub(crate) fn add_waiter(&mut self, has_credit: bool, max_wait: usize) -> Result<Waiter<T>> {
        if !has_credit && max_wait > 0 && self.wait_list.len() >= max_wait {
            return Err(Error::MaxWaitLimit);
        }

        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = oneshot::channel();
        let slot = WaiterSlot { id, tx };
        if has_credit {
            self.active_wait_list.push_back(slot);
        } else {
            self.wait_list.push_back(slot);
        }
        Ok(Waiter { id, rx })
    }

    /// Hand a freed credit onward: promote the oldest credit-less waiter if
    /// any, else release one gate permit, else (unbounded) drop it.
    pub(crate) fn put_credit(&mut self, gate: Option<&Semaphore>) {
        if let Some(slot) = self.wait_list.pop_front() {
            self.active_wait_list.push_back(slot);
            return;
        }
        if let Some(gate) = gate {
            gate.add_permits(1);
        }
    }

    /// Hand a connection to the oldest credited waiter.
    ///
    /// A waiter whose receive side is gone (timed out or cancelled) is
    /// skipped and its credit recycled through [`put_credit`](Self::put_credit).
    /// Returns the connection if nobody took it.
    pub(crate) fn deliver(
        &mut self,
        gate: Option<&Semaphore>,
        mut conn: PooledConn<T>,
    ) -> Option<PooledConn<T>> {
        while let Some(slot) = self.active_wait_list.pop_front() {
            match slot.tx.send(conn) {
                Ok(()) => return None,
                Err(back) => {
                    conn = back;
                    self.put_credit(gate);
                }
            }
        }
        Some(conn)
    }

    /// Detach a waiter by id, reporting which queue held it.
    pub(crate) fn remove(&mut self, id: u64) -> Removed {
        if let Some(pos) = self.wait_list.iter().position(|slot| slot.id == id) {
            self.wait_list.remove(pos);
            return Removed::Plain;
        }
        if let Some(pos) = self.active_wait_list.iter().position(|slot| slot.id == id) {
            self.active_wait_list.remove(pos);
            return Removed::Credited;
        }
        Removed::NotFound
    }
}
