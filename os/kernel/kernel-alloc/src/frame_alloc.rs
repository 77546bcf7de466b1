//! # Physical Frame Allocator
//!
//! Hands out 4 KiB physical frames from two regions:
//!
//! ```text
//! alloc_begin ┌──────────────────────────┐
//!             │ kernel region            │  kernel_pages frames, page tables
//!             ├──────────────────────────┤
//!             │ user region              │  everything else
//! alloc_end   └──────────────────────────┘
//! ```
//!
//! Each region keeps a LIFO free list threaded through the free frames and is
//! guarded by its own [`SpinLock`], so allocations in different regions never
//! contend. Frames come out as [`Frame`] handles; giving one back consumes it.

use crate::free_list::FreeList;
use kernel_info::memory::{KERNEL_PAGES, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, Size4K};
use kernel_sync::{Hart, SpinLock};
use kernel_vmem::{Frame, FrameAlloc, PhysMapper};
use log::{info, trace};

/// Which region a frame comes from or goes back to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RegionKind {
    /// Page tables and other kernel data structures.
    Kernel,
    /// Everything else.
    User,
}

/// Physical range handed to the allocator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PhysLayout {
    /// First usable byte, typically the end of the kernel image. Rounded up
    /// to a page.
    pub alloc_begin: PhysicalAddress,
    /// Frames in the kernel region.
    pub kernel_pages: u64,
    /// Exclusive end of usable memory. Rounded down to a page.
    pub alloc_end: PhysicalAddress,
}

impl PhysLayout {
    /// `[alloc_begin, ALLOC_END)` with a [`KERNEL_PAGES`] kernel region.
    #[must_use]
    pub const fn new(alloc_begin: PhysicalAddress) -> Self {
        Self {
            alloc_begin,
            kernel_pages: KERNEL_PAGES,
            alloc_end: PhysicalAddress::new(kernel_info::memory::ALLOC_END),
        }
    }

    #[must_use]
    pub const fn with_kernel_pages(mut self, kernel_pages: u64) -> Self {
        self.kernel_pages = kernel_pages;
        self
    }

    #[must_use]
    pub const fn with_end(mut self, alloc_end: PhysicalAddress) -> Self {
        self.alloc_end = alloc_end;
        self
    }
}

/// A [`PhysLayout`] that cannot be partitioned.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("allocation range {begin}..{end} is empty or inverted")]
    Inverted {
        begin: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("kernel region must hold at least one page")]
    EmptyKernelRegion,
    #[error("kernel region of {pages} pages from {start} runs past {end}")]
    KernelRegionPastEnd {
        start: PhysicalAddress,
        pages: u64,
        end: PhysicalAddress,
    },
}

/// Snapshot of one region, for diagnostics.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RegionStats {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
    /// Frames the region was built with.
    pub total: u64,
    /// Frames currently on the free list.
    pub free: u64,
}

/// One region's bounds and free list. Lives inside the region's lock.
struct Region {
    start: PhysicalAddress,
    end: PhysicalAddress,
    free: FreeList,
}

impl Region {
    const fn contains(&self, pa: PhysicalAddress) -> bool {
        self.start.as_u64() <= pa.as_u64() && pa.as_u64() < self.end.as_u64()
    }

    const fn total(&self) -> u64 {
        (self.end.as_u64() - self.start.as_u64()) / PAGE_SIZE
    }
}

/// Two-region physical frame allocator, safe to share between harts.
pub struct FrameAllocator<M: PhysMapper, H: Hart> {
    mapper: M,
    kernel: SpinLock<Region, H>,
    user: SpinLock<Region, H>,
}

impl<M: PhysMapper, H: Hart> FrameAllocator<M, H> {
    /// Partition `layout` and put every frame on its region's free list.
    ///
    /// Frames are pushed in ascending order, so the first allocation from a
    /// region returns its highest frame.
    ///
    /// # Errors
    /// If the layout is inverted, has no kernel frames, or the kernel region
    /// does not fit.
    ///
    /// # Safety
    /// - `[alloc_begin, alloc_end)` must be unused RAM, writable through
    ///   `mapper`, and owned by this allocator from now on.
    pub unsafe fn new(mapper: M, layout: PhysLayout) -> Result<Self, LayoutError> {
        let (kernel, user) = partition(layout)?;

        let kernel = unsafe { Region::build(&mapper, kernel.0, kernel.1) };
        let user = unsafe { Region::build(&mapper, user.0, user.1) };

        info!(
            "frames: kernel {}..{} ({} free), user {}..{} ({} free)",
            kernel.start,
            kernel.end,
            kernel.free.len(),
            user.start,
            user.end,
            user.free.len()
        );

        Ok(Self {
            mapper,
            kernel: SpinLock::new("kern_pmem", kernel),
            user: SpinLock::new("user_pmem", user),
        })
    }

    /// The mapper used to reach free-list nodes (and page tables).
    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    const fn lock_for(&self, kind: RegionKind) -> &SpinLock<Region, H> {
        match kind {
            RegionKind::Kernel => &self.kernel,
            RegionKind::User => &self.user,
        }
    }

    /// Take one frame from `kind`'s region. `None` when it is exhausted.
    ///
    /// Contents are whatever the previous owner left, plus the free-list link
    /// in the first bytes.
    pub fn alloc(&self, kind: RegionKind) -> Option<Frame> {
        let page = self
            .lock_for(kind)
            .with_lock(|r| unsafe { r.free.pop(&self.mapper) });
        trace!("alloc {kind:?} -> {page:?}");
        // Popped pages are owned by nobody else.
        page.map(|p| unsafe { Frame::from_page(p) })
    }

    /// Give `frame` back to `kind`'s region.
    ///
    /// The frame must have come from that region; this is only checked in
    /// debug builds.
    pub fn free(&self, frame: Frame, kind: RegionKind) {
        let page = frame.into_page();
        trace!("free {kind:?} <- {page:?}");
        self.lock_for(kind).with_lock(|r| {
            debug_assert!(
                r.contains(page.base()),
                "free: {page:?} is not part of the {kind:?} region"
            );
            unsafe { r.free.push(&self.mapper, page) }
        });
    }

    /// Frames currently free in `kind`'s region.
    pub fn free_count(&self, kind: RegionKind) -> u64 {
        self.lock_for(kind).with_lock(|r| r.free.len())
    }

    /// Bounds and counts of `kind`'s region.
    pub fn region(&self, kind: RegionKind) -> RegionStats {
        self.lock_for(kind).with_lock(|r| RegionStats {
            start: r.start,
            end: r.end,
            total: r.total(),
            free: r.free.len(),
        })
    }
}

/// Page tables come from the kernel region.
impl<M: PhysMapper, H: Hart> FrameAlloc for FrameAllocator<M, H> {
    fn alloc_frame(&self) -> Option<Frame> {
        self.alloc(RegionKind::Kernel)
    }

    fn free_frame(&self, frame: Frame) {
        self.free(frame, RegionKind::Kernel);
    }
}

type Bounds = (PhysicalAddress, PhysicalAddress);

/// Split `layout` into page-aligned kernel and user bounds.
fn partition(layout: PhysLayout) -> Result<(Bounds, Bounds), LayoutError> {
    let inverted = LayoutError::Inverted {
        begin: layout.alloc_begin,
        end: layout.alloc_end,
    };
    let begin = layout.alloc_begin.align_up::<Size4K>().ok_or(inverted)?;
    let end = layout.alloc_end.align_down::<Size4K>();
    if begin >= end {
        return Err(inverted);
    }
    if layout.kernel_pages == 0 {
        return Err(LayoutError::EmptyKernelRegion);
    }

    let past_end = LayoutError::KernelRegionPastEnd {
        start: begin,
        pages: layout.kernel_pages,
        end,
    };
    let kernel_end = layout
        .kernel_pages
        .checked_mul(PAGE_SIZE)
        .and_then(|len| begin.checked_add(len))
        .ok_or(past_end)?;
    if kernel_end > end {
        return Err(past_end);
    }

    Ok(((begin, kernel_end), (kernel_end, end)))
}

impl Region {
    /// Build a region over page-aligned `[start, end)`.
    ///
    /// # Safety
    /// Every frame in the range must be free and writable through `mapper`.
    unsafe fn build<M: PhysMapper>(
        mapper: &M,
        start: PhysicalAddress,
        end: PhysicalAddress,
    ) -> Self {
        let mut free = FreeList::new();
        let mut page = start.page::<Size4K>();
        while page.base() < end {
            unsafe { free.push(mapper, page) };
            let Some(next) = page.next() else {
                break;
            };
            page = next;
        }
        Self { start, end, free }
    }
}
