//! Kernel address space.
//!
//! The kernel identity-maps two physical windows: the device registers and
//! RAM. The tree is built once, from kernel-region frames, and then installed
//! on every hart as it comes up.
//!
//! # Example
//! ```ignore
//! let space = KernelSpace::init(&frames, &KernelLayout::default());
//! unsafe { space.activate_on_this_hart(frames.mapper(), &Sv39Mmu) };
//! ```

use crate::frame_alloc::FrameAllocator;
use kernel_info::memory::{MMIO_BASE, MMIO_SIZE, RAM_BASE, RAM_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::Hart;
use kernel_vmem::{AddressSpace, Mmu, PhysMapper, PteFlags};
use log::info;

/// A physical range mapped at the same virtual address.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IdentityWindow {
    pub base: PhysicalAddress,
    pub size: u64,
    pub flags: PteFlags,
}

impl IdentityWindow {
    #[must_use]
    pub const fn new(base: u64, size: u64, flags: PteFlags) -> Self {
        Self {
            base: PhysicalAddress::new(base),
            size,
            flags,
        }
    }
}

/// What the kernel address space maps.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct KernelLayout {
    /// Device registers, `R | W`.
    pub mmio: IdentityWindow,
    /// All of RAM, `R | W | X`.
    pub ram: IdentityWindow,
}

impl Default for KernelLayout {
    fn default() -> Self {
        Self {
            mmio: IdentityWindow::new(MMIO_BASE, MMIO_SIZE, PteFlags::KERNEL_RW),
            ram: IdentityWindow::new(RAM_BASE, RAM_SIZE, PteFlags::KERNEL_RWX),
        }
    }
}

/// The kernel's page-table tree, identified by its root.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct KernelSpace {
    root: PhysicalPage<Size4K>,
}

impl KernelSpace {
    /// Allocate a root from the kernel region and map both windows of `layout`.
    ///
    /// # Panics
    /// If the kernel region runs out of frames.
    pub fn init<M: PhysMapper, H: Hart>(
        frames: &FrameAllocator<M, H>,
        layout: &KernelLayout,
    ) -> Self {
        let Some(mut space) = AddressSpace::new(frames.mapper(), frames) else {
            panic!("init_kernel_space: no frame for the root table");
        };

        for window in [layout.mmio, layout.ram] {
            let va = VirtualAddress::new(window.base.as_u64());
            space.map_range(va, window.base, window.size, window.flags, frames);
            info!(
                "kernel space: {}..+{:#x} identity mapped [{}]",
                window.base, window.size, window.flags
            );
        }

        Self {
            root: space.root_page(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// Walker over this tree.
    ///
    /// # Safety
    /// `mapper` must reach the frames the tree was built from, and no other
    /// walker over this tree may be used while the returned one is alive.
    #[inline]
    pub const unsafe fn address_space<'m, M: PhysMapper>(
        &self,
        mapper: &'m M,
    ) -> AddressSpace<'m, M> {
        unsafe { AddressSpace::from_root(mapper, self.root) }
    }

    /// Install the kernel tree on the calling hart and flush its TLB.
    ///
    /// # Safety
    /// The kernel image and the current stack must lie inside the mapped
    /// windows, and `mapper` must reach the tree's frames.
    pub unsafe fn activate_on_this_hart<M: PhysMapper>(&self, mapper: &M, mmu: &impl Mmu) {
        unsafe { self.address_space(mapper).activate(mmu) };
    }
}
