#![allow(dead_code)]

use kernel_alloc::phys_mapper::IdentityMapper;
use kernel_alloc::{FrameAllocator, PhysLayout};
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::hart::ThreadHart;

pub const PAGE: u64 = 4096;

pub type Frames = FrameAllocator<IdentityMapper, ThreadHart>;

/// A 4 KiB-aligned page of host memory standing in for a physical frame.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct Page([u8; 4096]);

/// Heap "RAM": host addresses double as physical addresses.
pub struct Arena {
    pages: Vec<Page>,
}

impl Arena {
    pub fn new(pages: usize) -> Self {
        Self {
            pages: vec![Page([0xA5; 4096]); pages],
        }
    }

    pub fn base(&mut self) -> PhysicalAddress {
        PhysicalAddress::new(self.pages.as_mut_ptr().expose_provenance() as u64)
    }

    pub fn page(&mut self, i: u64) -> PhysicalAddress {
        self.base() + i * PAGE
    }

    pub fn end(&mut self) -> PhysicalAddress {
        let len = self.pages.len() as u64;
        self.page(len)
    }

    /// Kernel region of `kernel_pages` at the start, user region for the rest.
    pub fn layout(&mut self, kernel_pages: u64) -> PhysLayout {
        PhysLayout::new(self.base())
            .with_kernel_pages(kernel_pages)
            .with_end(self.end())
    }

    pub fn frames(&mut self, kernel_pages: u64) -> Frames {
        let layout = self.layout(kernel_pages);
        unsafe { Frames::new(IdentityMapper, layout) }.expect("layout")
    }
}
