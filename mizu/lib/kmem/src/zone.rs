use core::num::NonZeroUsize;

use bitflags::bitflags;
use mips_paging::{order_pages, order_size, PAddr, MAX_ORDER};

use crate::{Arena, MemMap, MAX_REGIONS};

/// Physical memory classes, ordered from the most to the least constrained.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Zone {
    /// Reachable by 24-bit ISA-style DMA.
    Dma,
    /// Reachable by 32-bit DMA.
    Dma32,
    Normal,
    /// Not permanently mapped into the kernel.
    HighMem,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct GfpFlags: u32 {
        /// Allocate from [`Zone::Dma`] only.
        const DMA = 1 << 0;
        /// Allocate from [`Zone::Dma32`] or below.
        const DMA32 = 1 << 1;
        /// High memory is acceptable.
        const HIGHMEM = 1 << 2;
        /// Fail at once instead of trying to reclaim memory.
        const NORETRY = 1 << 3;
        /// Zero the block before returning it.
        const ZERO = 1 << 4;

        const ZONE_MASK = Self::DMA.bits() | Self::DMA32.bits() | Self::HIGHMEM.bits();
    }
}

/// Which constrained zones the kernel was configured with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZoneConfig {
    pub has_dma: bool,
    pub has_dma32: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            has_dma: config::HAS_ZONE_DMA,
            has_dma32: config::HAS_ZONE_DMA32,
        }
    }
}

impl GfpFlags {
    /// The zones an allocation with these flags may be served from, in
    /// preference order.
    pub fn zonelist(self) -> &'static [Zone] {
        if self.contains(GfpFlags::DMA) {
            &[Zone::Dma]
        } else if self.contains(GfpFlags::DMA32) {
            &[Zone::Dma32, Zone::Dma]
        } else if self.contains(GfpFlags::HIGHMEM) {
            &[Zone::HighMem, Zone::Normal, Zone::Dma32, Zone::Dma]
        } else {
            &[Zone::Normal, Zone::Dma32, Zone::Dma]
        }
    }
}

/// The page allocator as seen by DMA code.
pub trait PageAlloc: Send + Sync {
    /// Allocate `1 << order` physically contiguous pages.
    fn alloc_pages(&self, gfp: GfpFlags, order: u32) -> Option<PAddr>;

    /// # Safety
    ///
    /// `paddr` must come from [`PageAlloc::alloc_pages`] of the same allocator
    /// with the same `order`, and must not be used afterwards.
    unsafe fn free_pages(&self, paddr: PAddr, order: u32);
}

/// A page allocator with one [`Arena`] per linearly mapped region.
pub struct Zones {
    map: MemMap,
    arenas: heapless::Vec<(Zone, Arena), MAX_REGIONS>,
    reclaim: Option<fn() -> bool>,
}

impl Zones {
    /// Build arenas over every linearly mapped region of `map`.
    ///
    /// # Safety
    ///
    /// All memory in `map` with a linear mapping must be free and stay mapped
    /// for the lifetime of the allocator.
    pub unsafe fn new(map: MemMap) -> Self {
        let mut arenas = heapless::Vec::new();
        for region in map.regions() {
            if let Some(base) = region.linear {
                let arena = Arena::new(base..base + region.size());
                // `map` holds at most `MAX_REGIONS` regions.
                let _ = arenas.push((region.zone, arena));
            }
        }
        Zones {
            map,
            arenas,
            reclaim: None,
        }
    }

    /// Install a hook that tries to free memory, returning whether it did.
    ///
    /// Allocations without [`GfpFlags::NORETRY`] run it once before failing.
    pub fn with_reclaim(mut self, reclaim: fn() -> bool) -> Self {
        self.reclaim = Some(reclaim);
        self
    }

    pub fn memmap(&self) -> &MemMap {
        &self.map
    }

    pub fn used_pages(&self, zone: Zone) -> usize {
        (self.arenas.iter())
            .filter(|(z, _)| *z == zone)
            .map(|(_, arena)| arena.used_count())
            .sum()
    }

    fn try_alloc(&self, gfp: GfpFlags, order: u32) -> Option<PAddr> {
        let count = NonZeroUsize::new(order_pages(order))?;
        gfp.zonelist().iter().find_map(|&zone| {
            (self.arenas.iter())
                .filter(|(z, _)| *z == zone)
                .find_map(|(_, arena)| arena.allocate(count))
                .and_then(|laddr| self.map.virt_to_phys(laddr))
        })
    }
}

impl PageAlloc for Zones {
    fn alloc_pages(&self, gfp: GfpFlags, order: u32) -> Option<PAddr> {
        if order > MAX_ORDER {
            log::debug!("page allocation of order {order} rejected");
            return None;
        }
        let paddr = match self.try_alloc(gfp, order) {
            Some(paddr) => paddr,
            None => match self.reclaim {
                Some(reclaim) if !gfp.contains(GfpFlags::NORETRY) && reclaim() => {
                    self.try_alloc(gfp, order)?
                }
                _ => {
                    log::debug!("page allocation failed: order = {order}, flags = {gfp:?}");
                    return None;
                }
            },
        };
        if gfp.contains(GfpFlags::ZERO) {
            if let Some(laddr) = self.map.phys_to_virt(paddr) {
                unsafe { laddr.write_bytes(0, order_size(order)) }
            }
        }
        Some(paddr)
    }

    unsafe fn free_pages(&self, paddr: PAddr, order: u32) {
        let count = NonZeroUsize::new(order_pages(order)).expect("zero-sized block");
        let arena = self.map.phys_to_virt(paddr).and_then(|laddr| {
            (self.arenas.iter())
                .find(|(_, arena)| arena.contains(laddr))
                .map(|(_, arena)| (arena, laddr))
        });
        match arena {
            Some((arena, laddr)) => arena.deallocate(laddr, count),
            None => panic!("freeing {paddr:?} which was never allocated here"),
        }
    }
}
