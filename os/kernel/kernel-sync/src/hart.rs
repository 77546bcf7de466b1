//! # Harts
//!
//! A hart is one independently scheduled hardware thread. Lock ownership and
//! interrupt nesting are tracked per hart, so every primitive in this crate is
//! generic over a [`Hart`] implementation that answers two questions for the
//! *calling* hart: what is its id, and are its interrupts enabled.
//!
//! - [`RiscvHart`] reads the id from `tp` and toggles `sstatus.SIE`.
//! - [`ThreadHart`] (feature `std`) treats every OS thread as a hart with an
//!   emulated interrupt flag, which is how the host-side tests run.

use crate::irq::IrqNesting;

/// The calling hart's identity and interrupt controls.
///
/// All functions act on the hart that calls them; implementations must not
/// migrate a caller between harts in the middle of a call.
pub trait Hart {
    /// Logical id of the calling hart.
    fn id() -> usize;

    /// Whether interrupts are currently enabled on the calling hart.
    fn interrupts_enabled() -> bool;

    /// Enable interrupts on the calling hart.
    fn enable_interrupts();

    /// Disable interrupts on the calling hart.
    fn disable_interrupts();

    /// Run `f` with the calling hart's interrupt nesting record.
    fn with_nesting<R>(f: impl FnOnce(&IrqNesting) -> R) -> R;
}

#[cfg(target_arch = "riscv64")]
pub use riscv::RiscvHart;

#[cfg(any(test, feature = "std"))]
pub use emulated::ThreadHart;

#[cfg(target_arch = "riscv64")]
mod riscv {
    use super::Hart;
    use crate::irq::IrqNesting;
    use kernel_info::memory::MAX_HARTS;
    use kernel_registers::sstatus::{self, Sstatus};
    use kernel_registers::tp::ThreadPointer;
    use kernel_registers::{LoadRegister, LoadRegisterUnsafe};

    static NESTING: [IrqNesting; MAX_HARTS] = [const { IrqNesting::new() }; MAX_HARTS];

    /// The hart executing this code on a RISC-V machine in supervisor mode.
    pub struct RiscvHart;

    impl Hart for RiscvHart {
        #[inline]
        fn id() -> usize {
            ThreadPointer::load().hart_id()
        }

        #[inline]
        fn interrupts_enabled() -> bool {
            unsafe { Sstatus::load_unsafe() }.sie()
        }

        #[inline]
        fn enable_interrupts() {
            unsafe { sstatus::enable_interrupts() }
        }

        #[inline]
        fn disable_interrupts() {
            unsafe { sstatus::disable_interrupts() }
        }

        fn with_nesting<R>(f: impl FnOnce(&IrqNesting) -> R) -> R {
            let id = Self::id();
            let Some(nesting) = NESTING.get(id) else {
                panic!("hart {id} exceeds MAX_HARTS ({MAX_HARTS})");
            };
            f(nesting)
        }
    }
}

#[cfg(any(test, feature = "std"))]
mod emulated {
    use super::Hart;
    use crate::irq::IrqNesting;
    use core::cell::Cell;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    struct EmulatedHart {
        id: usize,
        interrupts: Cell<bool>,
        nesting: IrqNesting,
    }

    std::thread_local! {
        static CURRENT: EmulatedHart = EmulatedHart {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            interrupts: Cell::new(true),
            nesting: IrqNesting::new(),
        };
    }

    /// Every OS thread is a distinct hart whose interrupts start enabled.
    ///
    /// Ids are handed out on first use and never reused within a process.
    pub struct ThreadHart;

    impl Hart for ThreadHart {
        fn id() -> usize {
            CURRENT.with(|h| h.id)
        }

        fn interrupts_enabled() -> bool {
            CURRENT.with(|h| h.interrupts.get())
        }

        fn enable_interrupts() {
            CURRENT.with(|h| h.interrupts.set(true));
        }

        fn disable_interrupts() {
            CURRENT.with(|h| h.interrupts.set(false));
        }

        fn with_nesting<R>(f: impl FnOnce(&IrqNesting) -> R) -> R {
            CURRENT.with(|h| f(&h.nesting))
        }
    }
}
