#![no_std]

cfg_if::cfg_if! {
    if #[cfg(feature = "mt7621")] {
        #[path = "mt7621.rs"]
        mod imp;
    } else {
        #[path = "malta.rs"]
        mod imp;
    }
}

pub use imp::*;

pub const RAM_END: usize = RAM_START + RAM_SIZE;

/// Memory below this physical address is reachable by ISA-style 24-bit DMA.
pub const ZONE_DMA_END: usize = 16 * 1024 * 1024;
/// Memory below this physical address is reachable by 32-bit DMA.
pub const ZONE_DMA32_END: u64 = 1 << 32;

/// Memory above this physical address has no permanent kernel mapping.
pub const HIGHMEM_START: usize = 0x2000_0000;
