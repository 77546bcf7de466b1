#[cfg(all(feature = "asm", target_arch = "riscv64"))]
use crate::LoadRegister;

/// Thread pointer (`tp`, `x4`).
///
/// The boot code stores the hart id in `tp` before entering Rust and the
/// kernel never repurposes it, so reading it answers "which hart am I".
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ThreadPointer(u64);

impl ThreadPointer {
    #[inline]
    #[must_use]
    pub const fn from_bits(v: u64) -> Self {
        Self(v)
    }

    /// Hart id stored by the boot code.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn hart_id(self) -> usize {
        self.0 as usize
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl LoadRegister for ThreadPointer {
    #[inline]
    fn load() -> Self {
        let tp: u64;
        unsafe {
            core::arch::asm!("mv {}, tp", out(reg) tp, options(nomem, nostack, preserves_flags));
        }
        Self(tp)
    }
}
