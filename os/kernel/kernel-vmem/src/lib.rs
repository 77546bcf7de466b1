//! # Virtual Memory Support
//!
//! RISC-V Sv39 paging for a small multi-hart kernel.
//!
//! ## What you get
//! - An [`AddressSpace`] describing a three-level tree rooted at one table page.
//! - Sv39 [`PageTableEntry`] / [`PteFlags`] bit layouts and the 4 KiB-aligned
//!   [`PageTable`].
//! - The seams the walker needs from the rest of the kernel: a [`FrameAlloc`]
//!   handing out table pages as [`Frame`]s, a [`PhysMapper`] to reach them,
//!   and an [`Mmu`] to install a root on the calling hart.
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! A virtual address below [`VA_MAX`](info::VA_MAX) is divided into four fields:
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L2   |  L1   |  L0   | Offset |
//! ```
//!
//! Each level indexes a table of 512 (2⁹) entries of 8 bytes each. An entry is
//! either invalid (`V=0`), a pointer to the next table (`V=1`, `R=W=X=0`) or a
//! leaf mapping (`V=1` and any of `R`/`W`/`X`).
//!
//! ```text
//!  root (L2)  →  L1  →  L0  →  4 KiB physical page
//! ```
//!
//! Superpages are not used: every leaf lives in a level-0 table, and finding a
//! leaf higher up is treated as corruption.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod frame;
mod mmu;
pub mod page_table;

pub use crate::address_space::{AddressSpace, Translation, WalkError};
pub use crate::frame::{Frame, FrameAlloc};
pub use crate::mmu::Mmu;
#[cfg(target_arch = "riscv64")]
pub use crate::mmu::Sv39Mmu;
pub use crate::page_table::{EntryKind, PageTable, PageTableEntry, PteFlags, VpnIndex};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Converts physical addresses to *temporarily* usable pointers in the current
/// virtual address space.
///
/// The kernel identity-maps RAM, so its mapper is a plain cast; tests back
/// "physical memory" with a heap arena and translate into it.
///
/// # Safety
/// - You must ensure `pa` is mapped as writable in the current page tables
///   for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// Map a physical page table frame and return a mutable reference to it.
///
/// # Safety
/// - `page` must hold a page table (or be about to be zeroed into one).
/// - No other live reference may alias the same table.
#[inline]
pub(crate) unsafe fn table_mut<'a, M: PhysMapper + ?Sized>(
    m: &M,
    page: PhysicalPage<Size4K>,
) -> &'a mut PageTable {
    unsafe { m.phys_to_mut::<PageTable>(page.base()) }
}
