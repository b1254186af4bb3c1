/// Indicates how a lock was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    Read,
    Write,
    TryAcquire,
}

impl std::fmt::Display for LockAcquisition {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
            Self::TryAcquire => write!(f, "TryAcquire"),
        }
    }
}

/// Contains metadata about a lock
#[derive(Debug, Clone, Copy)]
pub struct LockInfo<'a> {
    name: Option<&'a str>,
}

impl LockInfo<'_> {
    /// get the lock's name
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name
    }
}

/// Represents an event (acquire/release) for a lock
#[derive(Debug, Clone)]
pub enum LockEvent<'a> {
    TryAcquire {
        info: LockInfo<'a>,
        acquisition: LockAcquisition,
        location: Option<&'static core::panic::Location<'static>>,
    },
    Acquire {
        info: LockInfo<'a>,
        acquisition: LockAcquisition,
        try_acquire_at: std::time::Instant,
        location: Option<&'static core::panic::Location<'static>>,
    },
    Release {
        info: LockInfo<'a>,
        acquisition: LockAcquisition,
        try_acquire_at: std::time::Instant,
        acquire_at: std::time::Instant,
        location: Option<&'static core::panic::Location<'static>>,
    },
}

impl LockEvent<'_> {
    pub fn event_type_name(&self) -> &str {
        match self {
            Self::TryAcquire { .. } => "TryAcquire",
            Self::Acquire { .. } => "Acquire",
            Self::Release { .. } => "Release",
        }
    }

    pub fn info(&self) -> &LockInfo<'_> {
        match self {
            Self::TryAcquire { info, .. } => info,
            Self::Acquire { info, .. } => info,
            Self::Release { info, .. } => info,
        }
    }

    /// how long the lock was held.  only known on release.
    pub fn held_for(&self) -> Option<std::time::Duration> {
        match self {
            Self::Release { acquire_at, .. } => Some(acquire_at.elapsed()),
            _ => None,
        }
    }
}

/// A callback fn for receiving [LockEvent] event
/// each time a lock is acquired or released.
pub type LockCallbackFn = fn(lock_event: LockEvent);

#[derive(Debug, Clone)]
pub(super) struct LockCallbackInfo {
    pub name: Option<String>,
    pub lock_callback_fn: Option<LockCallbackFn>,
}

impl LockCallbackInfo {
    #[inline]
    pub fn new(name: Option<String>, lock_callback_fn: Option<LockCallbackFn>) -> Self {
        Self {
            name,
            lock_callback_fn,
        }
    }

    #[inline]
    pub fn as_lock_info(&self) -> LockInfo<'_> {
        LockInfo {
            name: self.name.as_deref(),
        }
    }
}

#[inline]
pub(super) fn now() -> std::time::Instant {
    std::time::Instant::now()
}
