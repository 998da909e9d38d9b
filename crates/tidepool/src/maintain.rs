//! Periodic idle maintenance
//!
//! One background task per pool: every `check_idle_interval` it evicts
//! invalid idle connections, then shrinks surplus, then replenishes the
//! reserve. Evicting first means a healthy connection is never discarded
//! while invalid ones still occupy the store. The task holds only a weak reference and
//! exits when the pool closes or is dropped.

use std::sync::Arc;
use tracing::trace;

use crate::pool::Shared;
use crate::replenish::replenish_if_needed;

pub(crate) fn spawn_maintainer<T: Send + 'static>(shared: &Arc<Shared<T>>) {
    let weak = Arc::downgrade(shared);
    let close = shared.close.clone();
    let interval = shared.config.check_idle_interval;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = close.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            let Some(shared) = weak.upgrade() else { return };
            trace!("maintenance tick");
            shared.sweep_invalid();
            shared.shrink_surplus();
            replenish_if_needed(&shared);
        }
    });
}
