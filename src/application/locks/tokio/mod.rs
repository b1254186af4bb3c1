//! Provides a simplified tokio mutex type for sharing per-account state
//! between tasks.
//!
//! Every account owns one [AtomicMutex]. Holding its guard is what makes an
//! operation on that account exclusive: coin selection, transaction
//! building, the pending-debit bookkeeping and the snapshot update all happen
//! while the guard is alive.

mod atomic_mutex;
mod shared;

pub use atomic_mutex::AtomicMutex;
pub use atomic_mutex::AtomicMutexGuard;
use shared::now;
pub use shared::LockAcquisition;
pub use shared::LockCallbackFn;
use shared::LockCallbackInfo;
pub use shared::LockEvent;
pub use shared::LockInfo;

/// Lock event callback that reports acquisitions and releases at `trace`
/// level.
///
/// Accounts install this on their lock so that contention between
/// operations on the same account shows up in the log with
/// `RUST_LOG=hd_wallet_core::application::locks=trace`.
pub fn log_lock_event(lock_event: LockEvent) {
    let (event, info, acquisition) = match lock_event {
        LockEvent::TryAcquire {
            info, acquisition, ..
        } => ("TryAcquire", info, acquisition),
        LockEvent::Acquire {
            info, acquisition, ..
        } => ("Acquire", info, acquisition),
        LockEvent::Release {
            info, acquisition, ..
        } => ("Release", info, acquisition),
    };

    tracing::trace!(
        "{} lock `{}` for `{}` by thread {:?}",
        event,
        info.name().unwrap_or("?"),
        acquisition,
        std::thread::current().id(),
    );
}

pub const LOG_LOCK_EVENT_CB: LockCallbackFn = log_lock_event;
