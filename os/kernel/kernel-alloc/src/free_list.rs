use core::ptr;
use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_vmem::PhysMapper;

/// Header stored at the beginning of every **free** frame.
///
/// ```text
/// +-----------------+--------------------------------+
/// | FreeNode (next) |  rest of the frame (unused)    |
/// +-----------------+--------------------------------+
/// ^ frame base
/// ```
///
/// The list needs no memory besides the free frames themselves.
#[repr(C)]
struct FreeNode {
    next: Option<PhysicalPage<Size4K>>,
}

/// A LIFO stack of free frames linked through their first bytes.
///
/// # Invariants
/// - `len` equals the number of nodes reachable from `head`.
/// - Every listed frame is free and reachable through the mapper in use.
pub(crate) struct FreeList {
    head: Option<PhysicalPage<Size4K>>,
    len: u64,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub(crate) const fn len(&self) -> u64 {
        self.len
    }

    /// Push `page` onto the list, overwriting its first bytes.
    ///
    /// # Safety
    /// - `page` must be free, writable through `mapper`, and not already listed.
    pub(crate) unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, page: PhysicalPage<Size4K>) {
        let node = ptr::from_mut(unsafe { mapper.phys_to_mut::<FreeNode>(page.base()) });
        unsafe { node.write(FreeNode { next: self.head }) };
        self.head = Some(page);
        self.len += 1;
    }

    /// Pop the most recently pushed page.
    ///
    /// # Safety
    /// - `mapper` must be the one the list was built with.
    pub(crate) unsafe fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<PhysicalPage<Size4K>> {
        let page = self.head?;
        let node = unsafe { mapper.phys_to_mut::<FreeNode>(page.base()) };
        self.head = node.next;
        self.len -= 1;
        Some(page)
    }
}
