#![cfg_attr(not(test), no_std)]

mod arena;
mod kmap;
mod memmap;
mod page;
mod zone;

pub use mips_paging::{
    get_order, BusAddr, DmaMask, LAddr, PAddr, Pfn, MAX_ORDER, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE,
};

pub use self::{
    arena::Arena,
    kmap::{Kmap, KmapGuard, KmapWindow},
    memmap::{MemMap, Region, MAX_REGIONS},
    page::Page,
    zone::{GfpFlags, PageAlloc, Zone, ZoneConfig, Zones},
};
