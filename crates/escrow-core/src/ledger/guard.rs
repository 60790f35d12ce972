//! Reentrancy marker for mutating ledger calls.
//!
//! A mutating call runs inside a task-local scope. A second mutating call
//! made from inside that scope (for example from a token callback awaited
//! by the first) sees the marker and is refused before it can wait on the
//! serialization lock it would otherwise deadlock on.
//!
//! The marker is per task, not per ledger: while one ledger operation is
//! running, the same task cannot start a mutating call on any ledger.
//! Work spawned onto another task does not inherit the marker and simply
//! queues behind the lock.

use std::future::Future;

use crate::domain::{LedgerError, Result};
use crate::metrics::METRICS;

tokio::task_local! {
    static IN_LEDGER_CALL: ();
}

/// True while the current task is inside a mutating ledger call.
pub fn in_ledger_call() -> bool {
    IN_LEDGER_CALL.try_with(|_| ()).is_ok()
}

/// Run `op` with the marker set, or refuse if it is already set.
///
/// The marker is released when `op` finishes on every path, including
/// errors and cancellation, because it only lives as long as the scope.
pub(crate) async fn non_reentrant<F, T>(op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if in_ledger_call() {
        METRICS.inc_rejected();
        return Err(LedgerError::ReentrantCall);
    }
    IN_LEDGER_CALL.scope((), op).await
}
