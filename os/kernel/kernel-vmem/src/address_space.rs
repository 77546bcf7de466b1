//! # Address Space (Sv39, three levels)
//!
//! Helpers to build and manipulate a **single** virtual address space: a tree
//! of [`PageTable`] pages rooted at one table.
//!
//! ## Highlights
//!
//! - [`AddressSpace::get_entry`] walks to the level-0 slot of an address,
//!   optionally allocating the missing intermediate tables on the way.
//! - [`AddressSpace::map_range`] / [`AddressSpace::unmap_range`] install and
//!   remove page-granular leaf mappings.
//! - [`AddressSpace::query`] translates a VA to a PA.
//! - [`AddressSpace::dump`] logs every translation.
//! - [`AddressSpace::activate`] installs the root on the calling hart.
//!
//! ## Errors
//!
//! The walker's failure modes (address out of range, no frame for a table,
//! unmapping something that is not a mapped leaf) are programming errors in a
//! kernel, so the plain operations panic. Each has a `try_` twin returning
//! [`WalkError`] instead; the panic message is the error's message.
//!
//! ## Safety
//!
//! - There is no internal locking; callers serialize mutation of a shared tree.
//! - Mutating operations take `&mut self`, so one handle hands out at most one
//!   live entry reference. Handles over an existing root come from the unsafe
//!   [`AddressSpace::from_root`], whose caller vouches that no other handle
//!   touches the same tree meanwhile.
//! - Mutating active mappings requires TLB maintenance (see [`Mmu::flush_all`]).
//! - The provided `PhysMapper` must yield **writable** references to table frames.

use crate::info::{PAGE_SIZE, VA_MAX};
use crate::page_table::{EntryKind, PageTable, PageTableEntry, PteFlags, VpnIndex};
use crate::{Frame, FrameAlloc, Mmu, PhysMapper, table_mut};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::{debug, info, trace, warn};

/// Root-table entries reachable below [`VA_MAX`].
#[allow(clippy::cast_possible_truncation)]
const ROOT_ENTRIES: usize = (VA_MAX >> 30) as usize;

/// Why a walk or range operation failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    #[error("virtual address {0} out of range")]
    AddressOutOfRange(VirtualAddress),
    #[error("out of memory allocating a page table for {0}")]
    OutOfMemory(VirtualAddress),
    #[error("{0} not mapped")]
    NotMapped(VirtualAddress),
    #[error("{0} is not a leaf pte")]
    NotALeaf(VirtualAddress),
    #[error("unexpected leaf at level {level} while walking {va}")]
    UnexpectedLeaf { va: VirtualAddress, level: usize },
    #[error("range {va} + {len:#x} overflows")]
    RangeOverflow { va: VirtualAddress, len: u64 },
}

/// One valid leaf mapping, as reported by [`AddressSpace::for_each_translation`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Translation {
    pub va: VirtualAddress,
    pub pa: PhysicalAddress,
    pub flags: PteFlags,
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate and zero a fresh root table. `None` if `alloc` is exhausted.
    pub fn new(mapper: &'m M, alloc: &dyn FrameAlloc) -> Option<Self> {
        let root = alloc.alloc_frame()?.into_page();
        unsafe { table_mut(mapper, root) }.zero();
        debug!("new address space rooted at {root}");
        Some(Self { root, mapper })
    }

    /// Wrap an existing root table.
    ///
    /// # Safety
    /// - `root` must hold a valid page table reachable through `mapper`.
    /// - While the returned handle is alive, no other handle over the same tree
    ///   may be used to walk or mutate it.
    #[inline]
    pub const unsafe fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the root table.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn table(&self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        unsafe { table_mut(self.mapper, page) }
    }

    /// Walk to the level-0 slot for `va`.
    ///
    /// Missing intermediate tables are allocated from `create`, zeroed and
    /// linked in; without an allocator the walk stops and returns `None`. The
    /// returned slot itself may be invalid.
    ///
    /// The entry borrows the handle mutably, so walks are sequential:
    ///
    /// ```compile_fail
    /// use kernel_memory_addresses::VirtualAddress;
    /// use kernel_vmem::{AddressSpace, FrameAlloc, PhysMapper};
    ///
    /// fn alias<M: PhysMapper>(space: &mut AddressSpace<'_, M>, alloc: &dyn FrameAlloc) {
    ///     let va = VirtualAddress::new(0x1000);
    ///     let a = space.get_entry(va, Some(alloc));
    ///     let b = space.get_entry(va, None);
    ///     drop((a, b));
    /// }
    /// ```
    ///
    /// # Panics
    /// If `va >= VA_MAX`, if a table is needed and `create` is exhausted, or if
    /// a leaf shows up above level 0.
    pub fn get_entry(
        &mut self,
        va: VirtualAddress,
        create: Option<&dyn FrameAlloc>,
    ) -> Option<&mut PageTableEntry> {
        match self.walk(va, create) {
            Ok(entry) => entry,
            Err(err) => fatal("get_entry", err),
        }
    }

    /// Non-panicking [`get_entry`](Self::get_entry).
    ///
    /// # Errors
    /// [`WalkError::AddressOutOfRange`], [`WalkError::OutOfMemory`] and
    /// [`WalkError::UnexpectedLeaf`].
    pub fn try_get_entry(
        &mut self,
        va: VirtualAddress,
        create: Option<&dyn FrameAlloc>,
    ) -> Result<Option<&mut PageTableEntry>, WalkError> {
        self.walk(va, create)
    }

    /// Shared walk behind the entry accessors. The caller must not keep two
    /// results for the same slot alive.
    #[allow(clippy::mut_from_ref)]
    fn walk(
        &self,
        va: VirtualAddress,
        create: Option<&dyn FrameAlloc>,
    ) -> Result<Option<&mut PageTableEntry>, WalkError> {
        if va.as_u64() >= VA_MAX {
            return Err(WalkError::AddressOutOfRange(va));
        }

        let mut table = self.table(self.root);
        for level in [2, 1] {
            let slot = table.entry_mut(VpnIndex::of(va, level));
            let next = match slot.kind() {
                EntryKind::Table(page) => page,
                EntryKind::Leaf(..) => return Err(WalkError::UnexpectedLeaf { va, level }),
                EntryKind::Invalid => {
                    let Some(alloc) = create else {
                        return Ok(None);
                    };
                    let Some(frame) = alloc.alloc_frame() else {
                        return Err(WalkError::OutOfMemory(va));
                    };
                    let page = frame.into_page();
                    self.table(page).zero();
                    *slot = PageTableEntry::table(page);
                    trace!("level {level} table for {va} at {page}");
                    page
                }
            };
            table = self.table(next);
        }

        Ok(Some(table.entry_mut(VpnIndex::of(va, 0))))
    }

    /// Map every page touched by `[va, va + len)` to consecutive pages starting
    /// at `pa`, with `flags` plus `V`.
    ///
    /// Both addresses are rounded down to their page. Existing leaves are
    /// overwritten. A zero `len` maps nothing.
    ///
    /// # Panics
    /// On the conditions listed for [`try_map_range`](Self::try_map_range).
    pub fn map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        flags: PteFlags,
        alloc: &dyn FrameAlloc,
    ) {
        if let Err(err) = self.try_map_range(va, pa, len, flags, alloc) {
            fatal("map_range", err);
        }
    }

    /// Non-panicking [`map_range`](Self::map_range). Pages before the failing
    /// one stay mapped.
    ///
    /// # Errors
    /// [`WalkError::RangeOverflow`], plus anything
    /// [`try_get_entry`](Self::try_get_entry) reports for a page.
    pub fn try_map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        len: u64,
        flags: PteFlags,
        alloc: &dyn FrameAlloc,
    ) -> Result<(), WalkError> {
        if len == 0 {
            return Ok(());
        }
        let end = va
            .checked_add(len)
            .ok_or(WalkError::RangeOverflow { va, len })?;
        debug!("map {va}..{end} -> {pa} [{flags}]");

        let mut page = va.align_down::<Size4K>();
        let mut target = pa.page::<Size4K>();
        while page < end {
            let slot = self
                .try_get_entry(page, Some(alloc))?
                .ok_or(WalkError::OutOfMemory(page))?;
            *slot = PageTableEntry::leaf(target, flags);

            let Some(next) = page.checked_add(PAGE_SIZE) else {
                break;
            };
            page = next;
            target = target.next().ok_or(WalkError::RangeOverflow { va, len })?;
        }
        Ok(())
    }

    /// Remove the leaf mappings of every page touched by `[va, va + len)`.
    ///
    /// With `release`, each mapped frame is handed back to it before its entry
    /// is cleared. A zero `len` unmaps nothing. Intermediate tables are kept.
    ///
    /// # Panics
    /// If a page is not mapped, or its level-0 entry is not a leaf.
    pub fn unmap_range(&mut self, va: VirtualAddress, len: u64, release: Option<&dyn FrameAlloc>) {
        if let Err(err) = self.try_unmap_range(va, len, release) {
            fatal("unmap_range", err);
        }
    }

    /// Non-panicking [`unmap_range`](Self::unmap_range). Pages before the
    /// failing one stay unmapped.
    ///
    /// # Errors
    /// [`WalkError::NotMapped`], [`WalkError::NotALeaf`],
    /// [`WalkError::RangeOverflow`], plus walk errors.
    pub fn try_unmap_range(
        &mut self,
        va: VirtualAddress,
        len: u64,
        release: Option<&dyn FrameAlloc>,
    ) -> Result<(), WalkError> {
        if len == 0 {
            return Ok(());
        }
        let last = va
            .checked_add(len - 1)
            .ok_or(WalkError::RangeOverflow { va, len })?
            .align_down::<Size4K>();
        debug!("unmap {va}..={last} release={}", release.is_some());

        let mut page = va.align_down::<Size4K>();
        loop {
            let Some(slot) = self.try_get_entry(page, None)? else {
                return Err(WalkError::NotMapped(page));
            };
            match slot.kind() {
                EntryKind::Invalid => return Err(WalkError::NotMapped(page)),
                EntryKind::Table(_) => return Err(WalkError::NotALeaf(page)),
                EntryKind::Leaf(target, _) => {
                    if let Some(release) = release {
                        // The entry was the frame's only owner.
                        release.free_frame(unsafe { Frame::from_page(target) });
                    }
                    *slot = PageTableEntry::new();
                }
            }

            if page == last {
                return Ok(());
            }
            page += PAGE_SIZE;
        }
    }

    /// Translate `va`, including its in-page offset. `None` if unmapped or
    /// out of range.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.walk(va, None).ok()??.kind() {
            EntryKind::Leaf(page, _) => Some(page.join(va.offset::<Size4K>())),
            _ => None,
        }
    }

    /// Visit every valid leaf translation in ascending VA order.
    ///
    /// Walks the tree rather than probing every page below `VA_MAX`. Leaves
    /// above level 0 are skipped.
    pub fn for_each_translation(&self, mut f: impl FnMut(Translation)) {
        let root = self.table(self.root);
        for (i2, e2) in root.iter().take(ROOT_ENTRIES) {
            let EntryKind::Table(l1) = e2.kind() else {
                continue;
            };
            for (i1, e1) in self.table(l1).iter() {
                let EntryKind::Table(l0) = e1.kind() else {
                    continue;
                };
                for (i0, e0) in self.table(l0).iter() {
                    if let EntryKind::Leaf(page, flags) = e0.kind() {
                        f(Translation {
                            va: va_of(i2, i1, i0),
                            pa: page.base(),
                            flags,
                        });
                    }
                }
            }
        }
    }

    /// Log every translation as `VA -> PA flags`; returns how many were found.
    pub fn dump(&self) -> usize {
        info!("address space rooted at {}:", self.root);
        let mut count = 0;
        self.for_each_translation(|t| {
            info!(
                "VA {} -> PA {} flags {:#05x} [{}]",
                t.va,
                t.pa,
                t.flags.into_bits(),
                t.flags
            );
            count += 1;
        });
        info!("{count} translations");
        count
    }

    /// Install this tree on the calling hart and flush its TLB.
    ///
    /// # Safety
    /// See [`Mmu::set_root`]: the tree must map the code that runs next.
    pub unsafe fn activate(&self, mmu: &impl Mmu) {
        unsafe { mmu.set_root(self.root) };
        mmu.flush_all();
        debug!("activated address space {}", self.root);
    }
}

/// Base address selected by one index per level.
const fn va_of(l2: VpnIndex, l1: VpnIndex, l0: VpnIndex) -> VirtualAddress {
    let l2 = l2.as_usize() as u64;
    let l1 = l1.as_usize() as u64;
    let l0 = l0.as_usize() as u64;
    VirtualAddress::new((l2 << 30) | (l1 << 21) | (l0 << 12))
}

#[cold]
fn fatal(op: &str, err: WalkError) -> ! {
    if let WalkError::OutOfMemory(_) = err {
        warn!("{op}: frame allocator exhausted");
    }
    panic!("{op}: {err}");
}
