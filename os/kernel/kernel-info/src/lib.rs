//! # Kernel Memory Configuration
//!
//! Compile-time layout constants shared by the physical frame allocator,
//! the page-table walker and the synchronization primitives.
//!
//! ## Physical Memory Layout
//!
//! The kernel runs on a QEMU `virt`-style RISC-V machine with the
//! following physical map:
//!
//! ```text
//! MMIO_BASE    ┌─────────────────────────────────┐ 0x1000_0000
//!              │   Device registers (UART, ...)  │
//! MMIO_END     ├─────────────────────────────────┤ 0x2000_0000
//!              ┆                                 ┆
//! RAM_BASE     ├─────────────────────────────────┤ 0x8000_0000
//!              │   Kernel image (text, data)     │
//! alloc begin  ├─────────────────────────────────┤ end of kernel image
//!              │   Kernel frames (KERNEL_PAGES)  │
//!              ├─────────────────────────────────┤
//!              │   User frames                   │
//! ALLOC_END    └─────────────────────────────────┘ RAM_BASE + RAM_SIZE
//! ```
//!
//! The kernel address space identity-maps both the device window and RAM,
//! so a physical address can be dereferenced directly once paging is on.
//!
//! ## Virtual Address Layout (Sv39)
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L2   |  L1   |  L0   | Offset |
//! ```
//!
//! Only addresses below [`VA_MAX`](memory::VA_MAX) are accepted. Sv39 requires
//! bits 63‒39 to copy bit 38; staying below `1 << 38` keeps every accepted
//! address canonical without sign extension.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
