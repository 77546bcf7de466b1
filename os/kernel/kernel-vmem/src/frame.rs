use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Exclusive handle to one 4 KiB physical frame.
///
/// Not `Clone`/`Copy`: giving a frame back to its allocator consumes the
/// handle, so the same handle cannot be freed twice. When the frame's address
/// is stored elsewhere (a page-table entry, say), the handle is given up with
/// [`into_page`](Self::into_page) and rebuilt later with
/// [`from_page`](Self::from_page).
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Frame(PhysicalPage<Size4K>);

impl Frame {
    /// Claim ownership of `page`.
    ///
    /// # Safety
    /// No other `Frame` for `page` may exist, and the page must not be on any
    /// allocator's free list.
    #[inline]
    pub const unsafe fn from_page(page: PhysicalPage<Size4K>) -> Self {
        Self(page)
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage<Size4K> {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.0.base()
    }

    /// Give up the handle, keeping only the address.
    #[inline]
    #[must_use]
    pub const fn into_page(self) -> PhysicalPage<Size4K> {
        self.0
    }
}

/// Source of physical frames for page-table pages.
///
/// Takes `&self`: implementations shared between harts do their own locking.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` when exhausted. Contents are undefined.
    fn alloc_frame(&self) -> Option<Frame>;

    /// Return a frame obtained from [`alloc_frame`](Self::alloc_frame).
    fn free_frame(&self, frame: Frame);
}
