pub const RAM_START: usize = 0;
pub const RAM_SIZE: usize = 256 * 1024 * 1024;

pub const HAS_ZONE_DMA: bool = false;
pub const HAS_ZONE_DMA32: bool = false;

pub const DCACHE_LINE_SIZE: usize = 32;

pub const MAX_HARTS: usize = 4;

// Boards with less than 512 MiB see their RAM mirrored right above it. The
// mirror is not subject to the write-through CCA override of the low region,
// so uncached accesses go there.
pub const UNCACHED_SHADOW: Option<usize> = if RAM_SIZE < 512 * 1024 * 1024 {
    Some(RAM_SIZE)
} else {
    None
};
