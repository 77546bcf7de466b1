//! # Sv39 Page Tables
//!
//! - [`PteFlags`]: the ten low bits of an entry (`V R W X U G A D RSW`).
//! - [`PageTableEntry`]: one 64-bit entry; flags plus a 44-bit physical page number.
//! - [`EntryKind`]: decoded view of an entry (invalid / next table / leaf).
//! - [`PageTable`]: a 4 KiB-aligned array of 512 entries.
//! - [`VpnIndex`]: the 9-bit index a virtual address selects at one level.
//!
//! ## Bit layout
//!
//! | Bits  | Field | Meaning |
//! |-------|-------|---------|
//! | 0     | `V`   | Valid |
//! | 1     | `R`   | Readable |
//! | 2     | `W`   | Writable |
//! | 3     | `X`   | Executable |
//! | 4     | `U`   | Accessible from user mode |
//! | 5     | `G`   | Global mapping |
//! | 6     | `A`   | Accessed |
//! | 7     | `D`   | Dirty |
//! | 8–9   | `RSW` | Reserved for software |
//! | 10–53 | `PPN` | Physical address >> 12 |
//! | 54–63 | –     | Reserved, must be zero |
//!
//! A valid entry with `R=W=X=0` points to the next-level table; any of
//! `R`/`W`/`X` makes it a leaf.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Number of entries per table.
pub const ENTRIES: usize = 512;

/// Sv39 entry flag bits.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct PteFlags {
    /// Valid (V, bit 0).
    pub valid: bool,
    /// Readable (R, bit 1).
    pub readable: bool,
    /// Writable (W, bit 2). Hardware rejects `W` without `R`.
    pub writable: bool,
    /// Executable (X, bit 3).
    pub executable: bool,
    /// User-mode accessible (U, bit 4).
    pub user: bool,
    /// Global (G, bit 5): present in every address space.
    pub global: bool,
    /// Accessed (A, bit 6).
    pub accessed: bool,
    /// Dirty (D, bit 7).
    pub dirty: bool,
    /// Reserved for software (RSW, bits 8–9).
    #[bits(2)]
    pub rsw: u8,
    #[bits(6)]
    __: u8,
}

impl PteFlags {
    /// Mask of the flag bits stored in an entry.
    pub const MASK: u16 = 0x3FF;

    /// Kernel data and device registers: `R | W`.
    pub const KERNEL_RW: Self = Self::new().with_readable(true).with_writable(true);

    /// Kernel RAM: `R | W | X`.
    pub const KERNEL_RWX: Self = Self::KERNEL_RW.with_executable(true);

    /// Any of `R`/`W`/`X` set.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.readable() || self.writable() || self.executable()
    }
}

impl fmt::Display for PteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}{}{}{}{}{}",
            bit(self.dirty(), 'd'),
            bit(self.accessed(), 'a'),
            bit(self.global(), 'g'),
            bit(self.user(), 'u'),
            bit(self.executable(), 'x'),
            bit(self.writable(), 'w'),
            bit(self.readable(), 'r'),
            bit(self.valid(), 'v'),
        )
    }
}

/// A single Sv39 page table entry.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    #[bits(10)]
    flag_bits: u16,
    /// Physical page number of the target (next table or mapped page).
    #[bits(44)]
    ppn: u64,
    #[bits(10)]
    __: u16,
}

/// Decoded view of a [`PageTableEntry`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// `V=0`.
    Invalid,
    /// Pointer to the next-level table.
    Table(PhysicalPage<Size4K>),
    /// Leaf mapping of one page.
    Leaf(PhysicalPage<Size4K>, PteFlags),
}

impl PageTableEntry {
    /// Leaf entry mapping `page` with `flags`; `V` is forced on.
    #[inline]
    #[must_use]
    pub const fn leaf(page: PhysicalPage<Size4K>, flags: PteFlags) -> Self {
        Self::new()
            .with_flag_bits(flags.with_valid(true).into_bits() & PteFlags::MASK)
            .with_ppn(page.number())
    }

    /// Non-leaf entry pointing at the table in `page`.
    #[inline]
    #[must_use]
    pub const fn table(page: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_flag_bits(PteFlags::new().with_valid(true).into_bits())
            .with_ppn(page.number())
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits(self.flag_bits())
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.flags().valid()
    }

    /// Target page, regardless of validity.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.ppn())
    }

    #[inline]
    #[must_use]
    pub const fn kind(self) -> EntryKind {
        let flags = self.flags();
        if !flags.valid() {
            EntryKind::Invalid
        } else if flags.is_leaf() {
            EntryKind::Leaf(self.page(), flags)
        } else {
            EntryKind::Table(self.page())
        }
    }
}

/// Index into one table level, derived from a virtual address.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VpnIndex(u16);

impl VpnIndex {
    /// Extract the level-`level` index (0..=2) from `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress, level: usize) -> Self {
        debug_assert!(level <= 2);
        let shift = 12 + 9 * level;
        Self(((va.as_u64() >> shift) & 0x1FF) as u16)
    }

    /// Construct from a raw index.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One page-table page: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    /// Create a fully zeroed table (all entries invalid).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::new(); ENTRIES],
        }
    }

    /// Invalidate every entry in place.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::new());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: VpnIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn entry_mut(&mut self, i: VpnIndex) -> &mut PageTableEntry {
        &mut self.entries[i.as_usize()]
    }

    /// Entries with their indices, in index order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (VpnIndex, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (VpnIndex(i as u16), *e))
    }
}
