use kernel_memory_addresses::{PhysicalPage, Size4K};

/// The calling hart's translation hardware.
pub trait Mmu {
    /// Point translation at the table rooted in `root`.
    ///
    /// # Safety
    /// The new tree must map everything the caller is about to touch, in
    /// particular the currently executing code and stack.
    unsafe fn set_root(&self, root: PhysicalPage<Size4K>);

    /// Drop every cached translation on the calling hart.
    fn flush_all(&self);
}

#[cfg(target_arch = "riscv64")]
pub use riscv::Sv39Mmu;

#[cfg(target_arch = "riscv64")]
mod riscv {
    use super::Mmu;
    use kernel_memory_addresses::{PhysicalPage, Size4K};
    use kernel_registers::StoreRegisterUnsafe;
    use kernel_registers::satp::{Satp, sfence_vma_all};

    /// `satp` in Sv39 mode plus `sfence.vma`. Must run in supervisor mode.
    pub struct Sv39Mmu;

    impl Mmu for Sv39Mmu {
        #[inline]
        unsafe fn set_root(&self, root: PhysicalPage<Size4K>) {
            unsafe { Satp::sv39(root).store_unsafe() }
        }

        #[inline]
        fn flush_all(&self) {
            unsafe { sfence_vma_all() }
        }
    }
}
