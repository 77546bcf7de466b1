//! # Memory Layout

/// Size of a physical frame and of a base page.
pub const PAGE_SIZE: u64 = 4096;

/// Number of frames reserved for the kernel region of the frame allocator.
///
/// Page-table pages are always drawn from this region.
pub const KERNEL_PAGES: u64 = 2048;

/// Base of the device register window.
pub const MMIO_BASE: u64 = 0x1000_0000;

/// Size of the device register window.
pub const MMIO_SIZE: u64 = 0x1000_0000;

/// Base of physical RAM; the kernel image is loaded here.
pub const RAM_BASE: u64 = 0x8000_0000;

/// Size of physical RAM.
pub const RAM_SIZE: u64 = 128 * 1024 * 1024;

/// Exclusive end of the memory handed to the frame allocator.
pub const ALLOC_END: u64 = RAM_BASE + RAM_SIZE;

/// Exclusive upper bound of virtual addresses accepted by the page-table walker.
///
/// One bit less than the full Sv39 range, which avoids having to sign-extend
/// addresses with bit 38 set.
pub const VA_MAX: u64 = 1 << 38;

/// Maximum number of harts the kernel keeps per-hart state for.
pub const MAX_HARTS: usize = 8;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(MMIO_BASE.is_multiple_of(PAGE_SIZE) && MMIO_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(RAM_BASE.is_multiple_of(PAGE_SIZE) && RAM_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(MMIO_BASE + MMIO_SIZE <= RAM_BASE);
    assert!(ALLOC_END <= VA_MAX);
    assert!(KERNEL_PAGES * PAGE_SIZE < RAM_SIZE);
};
