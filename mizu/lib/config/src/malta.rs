pub const RAM_START: usize = 0;
pub const RAM_SIZE: usize = 256 * 1024 * 1024;

pub const HAS_ZONE_DMA: bool = true;
pub const HAS_ZONE_DMA32: bool = false;

pub const DCACHE_LINE_SIZE: usize = 32;

pub const MAX_HARTS: usize = 2;

pub const UNCACHED_SHADOW: Option<usize> = None;
