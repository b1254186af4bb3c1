use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use super::now;
use super::LockAcquisition;
use super::LockCallbackFn;
use super::LockCallbackInfo;
use super::LockEvent;

/// An `Arc<Mutex<T>>` wrapper to make data thread-safe and easy to work with.
///
/// # Examples
/// ```
/// # use hd_wallet_core::application::locks::tokio::AtomicMutex;
/// struct Book {
///     next_index: u32,
/// };
/// # tokio_test::block_on(async {
/// let book = AtomicMutex::from(Book { next_index: 0 });
/// book.lock_mut(|b| b.next_index += 1).await;
/// assert_eq!(book.lock(|b| b.next_index).await, 1);
/// # })
/// ```
///
/// It is also possible to provide a name and callback fn during
/// instantiation, so that the application can trace lock acquisitions.
///
/// # Examples
/// ```
/// # use hd_wallet_core::application::locks::tokio::{AtomicMutex, LOG_LOCK_EVENT_CB};
/// # tokio_test::block_on(async {
/// let counter = AtomicMutex::<u32>::from((0, Some("counter"), Some(LOG_LOCK_EVENT_CB)));
/// *counter.lock_guard().await += 5;
/// assert_eq!(counter.lock(|c| *c).await, 5);
/// # })
/// ```
#[derive(Debug)]
pub struct AtomicMutex<T> {
    inner: Arc<Mutex<T>>,
    lock_callback_info: LockCallbackInfo,
}

impl<T: Default> Default for AtomicMutex<T> {
    fn default() -> Self {
        Self {
            inner: Default::default(),
            lock_callback_info: LockCallbackInfo::new(None, None),
        }
    }
}

impl<T> From<T> for AtomicMutex<T> {
    #[inline]
    fn from(t: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(t)),
            lock_callback_info: LockCallbackInfo::new(None, None),
        }
    }
}

impl<T> From<(T, Option<String>, Option<LockCallbackFn>)> for AtomicMutex<T> {
    /// Create from an optional name and an optional callback function, which
    /// is called when a lock event occurs.
    #[inline]
    fn from(v: (T, Option<String>, Option<LockCallbackFn>)) -> Self {
        Self {
            inner: Arc::new(Mutex::new(v.0)),
            lock_callback_info: LockCallbackInfo::new(v.1, v.2),
        }
    }
}

impl<T> From<(T, Option<&str>, Option<LockCallbackFn>)> for AtomicMutex<T> {
    /// Create from a name ref and an optional callback function, which
    /// is called when a lock event occurs.
    #[inline]
    fn from(v: (T, Option<&str>, Option<LockCallbackFn>)) -> Self {
        Self {
            inner: Arc::new(Mutex::new(v.0)),
            lock_callback_info: LockCallbackInfo::new(v.1.map(|s| s.to_owned()), v.2),
        }
    }
}

impl<T> Clone for AtomicMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            lock_callback_info: self.lock_callback_info.clone(),
        }
    }
}

impl<T> AtomicMutex<T> {
    /// Acquire the lock and return an `AtomicMutexGuard`.
    ///
    /// The guard gives mutable access; the acquisition is reported as
    /// `Write` to the lock callback.
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    pub async fn lock_guard(&self) -> AtomicMutexGuard<'_, T> {
        self.try_acquire_cb(LockAcquisition::Write);

        let try_acquire_at = now();
        let guard = self.inner.lock().await;
        AtomicMutexGuard::new(
            guard,
            &self.lock_callback_info,
            LockAcquisition::Write,
            try_acquire_at,
        )
    }

    /// Attempt to acquire the lock. Returns an error if the lock is already
    /// held, otherwise returns Ok(guard).
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    pub fn try_lock_guard(&self) -> Result<AtomicMutexGuard<'_, T>, tokio::sync::TryLockError> {
        self.try_acquire_cb(LockAcquisition::TryAcquire);

        let try_acquire_at = now();
        let guard = self.inner.try_lock()?;
        Ok(AtomicMutexGuard::new(
            guard,
            &self.lock_callback_info,
            LockAcquisition::TryAcquire,
            try_acquire_at,
        ))
    }

    /// Immutably access the data of type `T` in a closure and possibly return a result of type `R`
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    pub async fn lock<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.try_acquire_cb(LockAcquisition::Read);

        let try_acquire_at = now();
        let inner_guard = self.inner.lock().await;
        let guard = AtomicMutexGuard::new(
            inner_guard,
            &self.lock_callback_info,
            LockAcquisition::Read,
            try_acquire_at,
        );
        f(&guard)
    }

    /// Mutably access the data of type `T` in a closure and possibly return a result of type `R`
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    pub async fn lock_mut<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.try_acquire_cb(LockAcquisition::Write);

        let try_acquire_at = now();
        let inner_guard = self.inner.lock().await;
        let mut guard = AtomicMutexGuard::new(
            inner_guard,
            &self.lock_callback_info,
            LockAcquisition::Write,
            try_acquire_at,
        );
        f(&mut guard)
    }

    #[cfg_attr(feature = "track-lock-location", track_caller)]
    fn try_acquire_cb(&self, acquisition: LockAcquisition) {
        if let Some(cb) = self.lock_callback_info.lock_callback_fn {
            cb(LockEvent::TryAcquire {
                info: self.lock_callback_info.as_lock_info(),
                acquisition,

                #[cfg(feature = "track-lock-location")]
                location: Some(core::panic::Location::caller()),
                #[cfg(not(feature = "track-lock-location"))]
                location: None,
            });
        }
    }
}

/// A wrapper for [MutexGuard] that can optionally call a callback to notify
/// when the lock event occurs.
#[derive(Debug)]
pub struct AtomicMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    lock_callback_info: &'a LockCallbackInfo,
    acquisition: LockAcquisition,
    try_acquire_at: std::time::Instant,
    acquire_at: std::time::Instant,
    location: Option<&'static core::panic::Location<'static>>,
}

impl<'a, T> AtomicMutexGuard<'a, T> {
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    fn new(
        guard: MutexGuard<'a, T>,
        lock_callback_info: &'a LockCallbackInfo,
        acquisition: LockAcquisition,
        try_acquire_at: std::time::Instant,
    ) -> Self {
        let my_guard = Self {
            guard,
            lock_callback_info,
            acquisition,
            try_acquire_at,
            acquire_at: now(),

            #[cfg(feature = "track-lock-location")]
            location: Some(core::panic::Location::caller()),
            #[cfg(not(feature = "track-lock-location"))]
            location: None,
        };

        if let Some(cb) = lock_callback_info.lock_callback_fn {
            cb(LockEvent::Acquire {
                info: lock_callback_info.as_lock_info(),
                acquisition,
                try_acquire_at: my_guard.try_acquire_at,
                location: my_guard.location,
            });
        }

        my_guard
    }
}

impl<T> Drop for AtomicMutexGuard<'_, T> {
    fn drop(&mut self) {
        let lock_callback_info = self.lock_callback_info;
        if let Some(cb) = lock_callback_info.lock_callback_fn {
            cb(LockEvent::Release {
                info: lock_callback_info.as_lock_info(),
                acquisition: self.acquisition,
                try_acquire_at: self.try_acquire_at,
                acquire_at: self.acquire_at,
                location: self.location,
            });
        }
    }
}

impl<T> Deref for AtomicMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for AtomicMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use tracing_test::traced_test;

    use super::*;

    static RELEASES: AtomicUsize = AtomicUsize::new(0);

    fn count_releases(lock_event: LockEvent) {
        if let LockEvent::Release { .. } = lock_event {
            RELEASES.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let atomic_unit = AtomicMutex::<()>::from(());
        assert!(
            atomic_unit.try_lock_guard().is_ok(),
            "Must succeed when no lock is held"
        );

        let _held_lock = atomic_unit.try_lock_guard().unwrap();
        assert!(
            atomic_unit.try_lock_guard().is_err(),
            "Must fail when lock is held"
        );
    }

    #[tokio::test]
    async fn clones_share_the_same_lock() {
        let book = AtomicMutex::from(vec![1u32]);
        let other = book.clone();

        let guard = book.lock_guard().await;
        assert!(other.try_lock_guard().is_err());
        drop(guard);

        other.lock_mut(|v| v.push(2)).await;
        assert_eq!(book.lock(|v| v.clone()).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn callback_sees_every_release() {
        const CB: LockCallbackFn = count_releases;
        let before = RELEASES.load(Ordering::SeqCst);

        let named = AtomicMutex::<u8>::from((0, Some("named"), Some(CB)));
        named.lock(|_| ()).await;
        named.lock_mut(|v| *v = 3).await;
        drop(named.lock_guard().await);

        assert_eq!(RELEASES.load(Ordering::SeqCst) - before, 3);
    }
}
