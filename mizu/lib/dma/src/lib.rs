//! DMA mapping and cache coherence for MIPS systems whose devices may not
//! snoop the CPU caches.
//!
//! Drivers go through [`DmaOps`], installed once with [`init_ops`]. The
//! default implementation decides per device whether cache maintenance is
//! needed, applies it page by page, and translates physical addresses to bus
//! addresses through the platform.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(
    any(target_arch = "mips", target_arch = "mips64"),
    feature(asm_experimental_arch)
)]

extern crate alloc;

pub mod cache;
pub mod coherence;
mod coherent;
pub mod debug;
mod device;
mod dir;
mod error;
mod ops;
pub mod platform;
mod sg;
#[cfg(test)]
mod sim;

pub use self::{
    coherence::{Classifier, CpuType},
    coherent::{Coherent, Noncoherent},
    device::Device,
    dir::Direction,
    error::Error,
    ops::{init_ops, ops, DefaultOps, DmaOps},
    platform::Platform,
    sg::ScatterEntry,
};
