//! # Identity PhysMapper for Kernel Virtual Memory
//!
//! The kernel address space maps RAM and the device window at their physical
//! addresses, and paging is off until the kernel space is activated. Either
//! way a physical address can be dereferenced as-is, so the mapper is a cast.
//!
//! Host-side tests rely on the same property: a heap buffer's address is used
//! as its "physical" address.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::IdentityMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_vmem::{PageTable, PhysMapper};
//!
//! let mut backing = Box::new(PageTable::zeroed());
//! let pa = PhysicalAddress::new((&raw mut *backing).expose_provenance() as u64);
//! let table: &mut PageTable = unsafe { IdentityMapper.phys_to_mut(pa) };
//! table.zero();
//! ```

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for identity-mapped (or untranslated) physical memory.
///
/// # Safety
/// - The referenced physical range must be identity mapped, or translation
///   must be off.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = core::ptr::with_exposed_provenance_mut::<T>(pa.as_u64() as usize);
        // SAFETY: Caller guarantees the address is mapped and holds a T.
        unsafe { &mut *ptr }
    }
}
