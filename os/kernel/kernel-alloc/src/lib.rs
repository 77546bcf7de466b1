//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! Physical frame allocation and the kernel address space for a multi-hart
//! RISC-V kernel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                MemoryManager                        │
//! │    • Owns the frame allocator                       │
//! │    • Builds the kernel space exactly once           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Kernel Space ([`vmm`])                 │
//! │    • Identity maps device registers and RAM         │
//! │    • Installed per hart via satp + sfence.vma       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • 4 KiB frames, kernel and user regions          │
//! │    • Intrusive LIFO free lists, one lock each       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Physical memory is reached through [`phys_mapper::IdentityMapper`]; the
//! page-table walker itself lives in `kernel-vmem`.
//!
//! ## Usage
//! ```ignore
//! use kernel_alloc::{KernelMemory, PhysLayout, vmm::KernelLayout};
//! use kernel_vmem::Sv39Mmu;
//!
//! // Boot hart, once.
//! static MEMORY: SyncOnceCell<KernelMemory> = SyncOnceCell::new();
//! let memory = MEMORY.get_or_init(|| unsafe {
//!     KernelMemory::new(IdentityMapper, PhysLayout::new(kernel_end), KernelLayout::default())
//!         .unwrap_or_else(|e| panic!("pmem_init: {e}"))
//! });
//! memory.init_kernel_space();
//!
//! // Every hart.
//! unsafe { memory.activate_on_this_hart(&Sv39Mmu) };
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
mod free_list;
pub mod phys_mapper;
pub mod vmm;

pub use crate::frame_alloc::{FrameAllocator, LayoutError, PhysLayout, RegionKind, RegionStats};
use crate::vmm::{KernelLayout, KernelSpace};
use kernel_sync::{Hart, SyncOnceCell};
use kernel_vmem::{Mmu, PhysMapper};
use log::info;

/// The memory context of a running kernel on RISC-V hardware.
#[cfg(target_arch = "riscv64")]
pub type KernelMemory = MemoryManager<phys_mapper::IdentityMapper, kernel_sync::hart::RiscvHart>;

/// Frame allocator plus the lazily built kernel address space.
pub struct MemoryManager<M: PhysMapper, H: Hart> {
    frames: FrameAllocator<M, H>,
    layout: KernelLayout,
    kernel: SyncOnceCell<KernelSpace>,
}

impl<M: PhysMapper, H: Hart> MemoryManager<M, H> {
    /// Build the frame allocator over `phys`. The kernel space is not built yet.
    ///
    /// # Errors
    /// See [`FrameAllocator::new`].
    ///
    /// # Safety
    /// See [`FrameAllocator::new`].
    pub unsafe fn new(
        mapper: M,
        phys: PhysLayout,
        layout: KernelLayout,
    ) -> Result<Self, LayoutError> {
        let frames = unsafe { FrameAllocator::new(mapper, phys)? };
        Ok(Self {
            frames,
            layout,
            kernel: SyncOnceCell::new(),
        })
    }

    #[inline]
    pub const fn frames(&self) -> &FrameAllocator<M, H> {
        &self.frames
    }

    /// The kernel space, if [`init_kernel_space`](Self::init_kernel_space) ran.
    #[inline]
    pub fn kernel_space(&self) -> Option<&KernelSpace> {
        self.kernel.get()
    }

    /// Build the kernel space on first call; later calls return the same one.
    ///
    /// # Panics
    /// If the kernel region cannot hold the tables.
    pub fn init_kernel_space(&self) -> &KernelSpace {
        self.kernel.get_or_init(|| {
            let space = KernelSpace::init(&self.frames, &self.layout);
            info!(
                "kernel space ready, root {}, {} kernel frames left",
                space.root_page(),
                self.frames.free_count(RegionKind::Kernel)
            );
            space
        })
    }

    /// Switch the calling hart to the kernel space, building it if needed.
    ///
    /// # Safety
    /// See [`KernelSpace::activate_on_this_hart`].
    pub unsafe fn activate_on_this_hart(&self, mmu: &impl Mmu) {
        let space = self.init_kernel_space();
        unsafe { space.activate_on_this_hart(self.frames.mapper(), mmu) };
    }
}
