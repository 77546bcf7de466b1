use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// `satp`: Supervisor Address Translation and Protection register (RV64).
///
/// Selects the paging mode and holds the physical page number of the root
/// page table for the current hart.
///
/// | Bits  | Field  | Meaning |
/// |-------|--------|---------|
/// | 0–43  | `PPN`  | Root table physical address >> 12 |
/// | 44–59 | `ASID` | Address space identifier |
/// | 60–63 | `MODE` | 0 = Bare, 8 = Sv39, 9 = Sv48 |
#[bitfield(u64)]
pub struct Satp {
    /// Bits 0–43: physical page number of the root page table.
    #[bits(44)]
    pub ppn: u64,

    /// Bits 44–59: address space identifier.
    #[bits(16)]
    pub asid: u16,

    /// Bits 60–63: translation mode.
    #[bits(4)]
    pub mode: u8,
}

impl Satp {
    /// Translation disabled.
    pub const MODE_BARE: u8 = 0;

    /// Three-level, 39-bit virtual addressing.
    pub const MODE_SV39: u8 = 8;

    /// Build an Sv39 `satp` value pointing at `root` with ASID 0.
    #[must_use]
    pub const fn sv39(root: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_mode(Self::MODE_SV39)
            .with_ppn(root.number())
    }

    /// The root page table referenced by this value.
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.ppn())
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl LoadRegisterUnsafe for Satp {
    unsafe fn load_unsafe() -> Self {
        let satp: u64;
        unsafe {
            core::arch::asm!("csrr {}, satp", out(reg) satp, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(satp)
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl StoreRegisterUnsafe for Satp {
    unsafe fn store_unsafe(self) {
        let satp = self.into_bits();
        unsafe {
            core::arch::asm!("csrw satp, {}", in(reg) satp, options(nostack, preserves_flags));
        }
    }
}

/// Invalidate every cached translation on the calling hart (`sfence.vma zero, zero`).
///
/// Also orders preceding page-table stores before subsequent implicit
/// translation reads.
///
/// # Safety
/// Requires supervisor mode.
#[cfg(all(feature = "asm", target_arch = "riscv64"))]
#[inline]
pub unsafe fn sfence_vma_all() {
    unsafe {
        core::arch::asm!("sfence.vma zero, zero", options(nostack, preserves_flags));
    }
}
