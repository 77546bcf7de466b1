use bitfield_struct::bitfield;

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
use crate::LoadRegisterUnsafe;

/// `sstatus`: Supervisor Status register (RV64), interrupt-related subset.
///
/// Only the fields the kernel touches are named; the rest is kept as opaque
/// padding so a loaded value round-trips unchanged.
#[bitfield(u64)]
pub struct Sstatus {
    /// Bit 0: reserved (was `UIE`).
    #[bits(1)]
    __: u8,

    /// Bit 1: `SIE`: supervisor interrupts enabled.
    pub sie: bool,

    /// Bits 2–4: reserved.
    #[bits(3)]
    __: u8,

    /// Bit 5: `SPIE`: `SIE` prior to the last trap.
    pub spie: bool,

    /// Bits 6–7: `UBE` and reserved.
    #[bits(2)]
    __: u8,

    /// Bit 8: `SPP`: privilege level prior to the last trap.
    pub spp: bool,

    /// Bits 9–63: remaining fields (`VS`, `FS`, `XS`, `SUM`, `MXR`, `UXL`, `SD`).
    #[bits(55)]
    __: u64,
}

impl Sstatus {
    /// Mask of the `SIE` bit for `csrs`/`csrc`.
    pub const SIE_MASK: u64 = 1 << 1;
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl LoadRegisterUnsafe for Sstatus {
    unsafe fn load_unsafe() -> Self {
        let sstatus: u64;
        unsafe {
            core::arch::asm!("csrr {}, sstatus", out(reg) sstatus, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(sstatus)
    }
}

/// Set `sstatus.SIE` on the calling hart.
///
/// # Safety
/// Requires supervisor mode and a trap vector able to take the interrupt.
#[cfg(all(feature = "asm", target_arch = "riscv64"))]
#[inline]
pub unsafe fn enable_interrupts() {
    unsafe {
        core::arch::asm!("csrs sstatus, {}", in(reg) Sstatus::SIE_MASK, options(nostack, preserves_flags));
    }
}

/// Clear `sstatus.SIE` on the calling hart.
///
/// # Safety
/// Requires supervisor mode.
#[cfg(all(feature = "asm", target_arch = "riscv64"))]
#[inline]
pub unsafe fn disable_interrupts() {
    unsafe {
        core::arch::asm!("csrc sstatus, {}", in(reg) Sstatus::SIE_MASK, options(nostack, preserves_flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sie_is_bit_one() {
        let s = Sstatus::new().with_sie(true);
        assert_eq!(s.into_bits(), Sstatus::SIE_MASK);
        assert!(!Sstatus::from_bits(!Sstatus::SIE_MASK).sie());
        assert!(Sstatus::from_bits(1 << 8).spp());
    }
}
