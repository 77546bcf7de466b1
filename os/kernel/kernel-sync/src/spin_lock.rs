use crate::{Hart, RawSpinLock};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

/// Data guarded by a [`RawSpinLock`].
///
/// The guard releases the lock on every exit path, including unwinding, and
/// is not `Send`, so the release always happens on the acquiring hart.
pub struct SpinLock<T, H: Hart> {
    raw: RawSpinLock<H>,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross harts.
unsafe impl<T: Send, H: Hart> Sync for SpinLock<T, H> {}

impl<T, H: Hart> SpinLock<T, H> {
    pub const fn new(name: &'static str, inner: T) -> Self {
        Self {
            raw: RawSpinLock::new(name),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.raw.name()
    }

    /// Whether the calling hart holds the lock.
    #[inline]
    pub fn holding(&self) -> bool {
        self.raw.holding()
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T, H>> {
        if self.raw.try_acquire() {
            Some(SpinLockGuard::new(self))
        } else {
            None
        }
    }

    /// Spin until acquired, then return a guard.
    ///
    /// # Panics
    /// If the calling hart already holds the lock.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T, H> {
        self.raw.acquire();
        SpinLockGuard::new(self)
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T, H: Hart> {
    lock: &'a SpinLock<T, H>,
    _not_send: PhantomData<*mut ()>,
}

impl<'a, T, H: Hart> SpinLockGuard<'a, T, H> {
    const fn new(lock: &'a SpinLock<T, H>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl<T, H: Hart> Deref for SpinLockGuard<'_, T, H> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T, H: Hart> DerefMut for SpinLockGuard<'_, T, H> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T, H: Hart> Drop for SpinLockGuard<'_, T, H> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}
