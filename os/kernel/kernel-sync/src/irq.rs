//! # Nested interrupt disabling
//!
//! Locks keep interrupts off on the holding hart, and a hart may hold several
//! locks at once. [`push_off`] and [`pop_off`] count the nesting depth per
//! hart: the outermost `push_off` remembers whether interrupts were enabled,
//! and only the `pop_off` that brings the depth back to zero restores that
//! state. A naive enable-on-release would turn interrupts back on while an
//! outer critical section is still running.
//!
//! ```
//! use kernel_sync::hart::ThreadHart;
//! use kernel_sync::{Hart, pop_off, push_off};
//!
//! assert!(ThreadHart::interrupts_enabled());
//! push_off::<ThreadHart>();
//! push_off::<ThreadHart>();
//! pop_off::<ThreadHart>();
//! assert!(!ThreadHart::interrupts_enabled()); // still nested
//! pop_off::<ThreadHart>();
//! assert!(ThreadHart::interrupts_enabled());
//! ```

use crate::Hart;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Per-hart interrupt nesting record.
///
/// Only ever touched by its own hart, with interrupts disabled; the atomics
/// exist so the record can live in a shared `static` table.
pub struct IrqNesting {
    /// Number of outstanding `push_off` calls.
    depth: AtomicU32,
    /// Interrupt state observed by the outermost `push_off`.
    enabled_before: AtomicBool,
}

impl Default for IrqNesting {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqNesting {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            enabled_before: AtomicBool::new(false),
        }
    }

    /// Current nesting depth; zero outside any disabled scope.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Disable interrupts on the calling hart and increment its nesting depth.
///
/// The first call of a nesting chain records whether interrupts were enabled.
pub fn push_off<H: Hart>() {
    let was_enabled = H::interrupts_enabled();
    H::disable_interrupts();
    H::with_nesting(|n| {
        if n.depth.load(Ordering::Relaxed) == 0 {
            n.enabled_before.store(was_enabled, Ordering::Relaxed);
        }
        n.depth.fetch_add(1, Ordering::Relaxed);
    });
}

/// Decrement the calling hart's nesting depth, restoring the recorded
/// interrupt state once it reaches zero.
///
/// # Panics
/// If the hart has no outstanding [`push_off`].
pub fn pop_off<H: Hart>() {
    let restore = H::with_nesting(|n| {
        let depth = n.depth.load(Ordering::Relaxed);
        if depth == 0 {
            panic!("pop_off: unmatched pop_off on hart {}", H::id());
        }
        n.depth.store(depth - 1, Ordering::Relaxed);
        depth == 1 && n.enabled_before.load(Ordering::Relaxed)
    });
    if restore {
        H::enable_interrupts();
    }
}

/// RAII guard around [`push_off`] / [`pop_off`].
///
/// Not `Send`: the matching `pop_off` must run on the hart that pushed.
pub struct IrqGuard<H: Hart> {
    _hart: PhantomData<(H, *mut ())>,
}

impl<H: Hart> Default for IrqGuard<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hart> IrqGuard<H> {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        push_off::<H>();
        Self { _hart: PhantomData }
    }
}

impl<H: Hart> Drop for IrqGuard<H> {
    fn drop(&mut self) {
        pop_off::<H>();
    }
}
