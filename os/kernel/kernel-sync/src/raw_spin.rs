use crate::Hart;
use crate::irq::{pop_off, push_off};
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};

/// Owner value while the lock is free.
const NO_OWNER: usize = usize::MAX;

/// A non-reentrant spinlock owned by a hart.
///
/// Acquiring disables interrupts on the calling hart (nested, see
/// [`push_off`]) for as long as the lock is held. Acquiring a lock the hart
/// already holds would deadlock and panics instead; so does releasing a lock
/// the hart does not hold.
pub struct RawSpinLock<H: Hart> {
    /// Name used in diagnostics.
    name: &'static str,
    /// `true` while some hart is inside the critical section.
    locked: AtomicBool,
    /// Id of the holding hart; meaningful only while `locked`.
    owner: AtomicUsize,
    _hart: PhantomData<fn() -> H>,
}

impl<H: Hart> RawSpinLock<H> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(NO_OWNER),
            _hart: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the calling hart holds this lock. Never blocks.
    #[inline]
    #[must_use]
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == H::id()
    }

    /// Spin until the lock is acquired by the calling hart.
    ///
    /// # Panics
    /// If the calling hart already holds the lock.
    pub fn acquire(&self) {
        push_off::<H>();
        if self.holding() {
            panic!("acquire: hart {} already holds `{}`", H::id(), self.name);
        }

        // Test-and-set, spinning on a plain load while contended.
        while self.locked.swap(true, Ordering::Acquire) {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }

        // Critical-section accesses must not move above this point.
        fence(Ordering::SeqCst);
        self.owner.store(H::id(), Ordering::Relaxed);
    }

    /// Try once to acquire the lock.
    ///
    /// Returns `false` if another hart holds it, or if the calling hart
    /// already does; the interrupt state is left as it was in that case.
    pub fn try_acquire(&self) -> bool {
        push_off::<H>();
        if self.holding() || self.locked.swap(true, Ordering::Acquire) {
            pop_off::<H>();
            return false;
        }

        fence(Ordering::SeqCst);
        self.owner.store(H::id(), Ordering::Relaxed);
        true
    }

    /// Release the lock held by the calling hart.
    ///
    /// # Panics
    /// If the calling hart does not hold the lock.
    pub fn release(&self) {
        if !self.holding() {
            panic!("release: hart {} does not hold `{}`", H::id(), self.name);
        }

        self.owner.store(NO_OWNER, Ordering::Relaxed);

        // Critical-section accesses must be visible before the lock is seen free.
        fence(Ordering::SeqCst);
        self.locked.store(false, Ordering::Release);

        pop_off::<H>();
    }
}
