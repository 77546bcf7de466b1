//! # Typed RISC-V (RV64, S-mode) Registers
//!
//! Bitfield models of the supervisor control and status registers used by the
//! memory-management layer. The models themselves are plain values and can be
//! built and inspected on any target; the `asm` feature adds the CSR accesses,
//! which are only compiled for `riscv64`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "satp")]
pub mod satp;

#[cfg(feature = "sstatus")]
pub mod sstatus;

#[cfg(feature = "tp")]
pub mod tp;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require supervisor mode.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require supervisor mode.
    unsafe fn store_unsafe(self);
}

pub trait LoadRegister {
    /// # Safety
    /// It is generally safe to load this register even from user mode.
    fn load() -> Self;
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
