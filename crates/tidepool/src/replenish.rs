//! Background connection creation
//!
//! Replenishment is fire-and-forget but tracked: the in-flight count makes
//! the need computation idempotent under rapid repeated `get` bursts, so a
//! storm of checkouts cannot over-provision the upstream. Creation failures
//! never surface to callers (outside `wait_first_conn` init); they back off
//! and retry.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::conn::PooledConn;
use crate::error::{Error, Result};
use crate::pool::{PoolState, Shared};

/// Creation failures are usually upstream outages or throttling; an
/// immediate retry would land in the same failure.
const CREATE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Launch enough creation tasks to restore the idle reserve and serve every
/// credited waiter. No-op once the pool is closed.
pub(crate) fn replenish_if_needed<T: Send + 'static>(shared: &Arc<Shared<T>>) {
    if shared.is_closed() {
        return;
    }

    let need = {
        let mut state = shared.state.lock();
        let need = need_conn_count(shared, &state);
        if need < 1 {
            return;
        }
        state.connecting += need as usize;
        need as usize
    };

    debug!(count = need, "replenishing connections");
    for _ in 0..need {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let result = apply_connect(&shared).await;
            {
                let mut state = shared.state.lock();
                state.connecting = state.connecting.saturating_sub(1);
            }
            if let Err(err) = result {
                if !shared.is_closed() {
                    warn!(error = %err, "connection creation failed; backing off");
                    tokio::time::sleep(CREATE_RETRY_BACKOFF).await;
                    replenish_if_needed(&shared);
                }
            }
        });
    }
}

/// How many creations to launch right now.
///
/// The reserve target covers both the configured idle floor and every
/// credited waiter: once a demand spike is served, `min_idle` warm
/// connections must still remain for the next one. In-flight creations are
/// subtracted so repeated calls never over-commit.
fn need_conn_count<T: Send + 'static>(shared: &Shared<T>, state: &PoolState<T>) -> i64 {
    let waiting = state.registry.credited_len() as i64;
    let mut need = shared.config.min_idle as i64 + waiting - state.idle.len() as i64;
    if waiting > 0 && need < shared.config.batch_increment as i64 {
        need = shared.config.batch_increment as i64;
    }
    need - state.connecting as i64
}

/// Run one creator invocation under the connect deadline.
///
/// The creator future runs on its own task and auto-puts its connection on
/// success, so a success landing after the deadline is still accepted. The
/// cancellation token handed to the creator fires on deadline or pool
/// close.
pub(crate) async fn apply_connect<T: Send + 'static>(shared: &Arc<Shared<T>>) -> Result<()> {
    let cancel = shared.close.child_token();
    let fut = (shared.hooks.creator)(cancel.clone());
    let (done_tx, done_rx) = oneshot::channel::<Result<()>>();

    let task_shared = Arc::clone(shared);
    tokio::spawn(async move {
        match fut.await {
            Ok(value) => {
                task_shared.auto_put(PooledConn::new(value));
                let _ = done_tx.send(Ok(()));
            }
            Err(err) => {
                let _ = done_tx.send(Err(Error::create(err.to_string())));
            }
        }
    });

    tokio::select! {
        _ = shared.close.cancelled() => {
            cancel.cancel();
            Err(Error::PoolClosed)
        }
        _ = tokio::time::sleep(shared.config.connect_timeout) => {
            cancel.cancel();
            Err(Error::create(format!(
                "creator timed out after {:?}",
                shared.config.connect_timeout
            )))
        }
        result = done_rx => result.unwrap_or_else(|_| Err(Error::create("creator task failed"))),
    }
}
