//! # Kernel synchronization primitives
//!
//! - [`Hart`]: "which hart am I" plus interrupt control for the calling hart.
//! - [`push_off`] / [`pop_off`] / [`IrqGuard`]: nested interrupt disabling.
//! - [`RawSpinLock`] / [`SpinLock`]: hart-owned spinlocks that keep interrupts
//!   off while held and abort on self-deadlock.
//! - [`SyncOnceCell`]: one-time initialization.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

pub mod hart;
pub mod irq;
mod raw_spin;
mod spin_lock;
mod sync_once_cell;

pub use hart::Hart;
pub use irq::{IrqGuard, IrqNesting, pop_off, push_off};
pub use raw_spin::RawSpinLock;
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;

#[cfg(target_arch = "riscv64")]
pub type KernelSpinLock<T> = SpinLock<T, hart::RiscvHart>;
