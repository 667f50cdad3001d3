use core::ops::Range;

use mips_paging::{phys_to_kseg0, LAddr, PAddr, KSEG_SIZE};

use crate::{Page, Zone, ZoneConfig};

pub const MAX_REGIONS: usize = 8;

/// A physically contiguous run of RAM with a single zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub phys: Range<PAddr>,
    pub zone: Zone,
    /// Base of the permanent cached kernel mapping, `None` for high memory.
    pub linear: Option<LAddr>,
}

impl Region {
    pub fn contains(&self, paddr: PAddr) -> bool {
        self.phys.contains(&paddr)
    }

    pub fn size(&self) -> usize {
        self.phys.end.val() - self.phys.start.val()
    }

    fn linear_range(&self) -> Option<Range<LAddr>> {
        self.linear.map(|base| base..base + self.size())
    }
}

/// The physical memory layout as seen by the kernel.
#[derive(Clone, Debug, Default)]
pub struct MemMap {
    regions: heapless::Vec<Region, MAX_REGIONS>,
}

impl MemMap {
    pub const fn new() -> Self {
        MemMap {
            regions: heapless::Vec::new(),
        }
    }

    /// The layout of a 32-bit MIPS kernel running from KSEG0: the low
    /// 512 MiB are linearly mapped and split into the configured DMA zones,
    /// everything above is high memory.
    pub fn kseg0(ram: Range<PAddr>, zones: ZoneConfig) -> Self {
        let mut map = MemMap::new();
        let lowmem_end = config::HIGHMEM_START.min(KSEG_SIZE);
        let dma_end = if zones.has_dma { config::ZONE_DMA_END } else { 0 };
        let dma32_end = if zones.has_dma32 {
            usize::try_from(config::ZONE_DMA32_END).unwrap_or(usize::MAX)
        } else {
            dma_end
        };
        let limits = [
            (dma_end, Zone::Dma),
            (dma32_end.min(lowmem_end), Zone::Dma32),
            (lowmem_end, Zone::Normal),
            (usize::MAX, Zone::HighMem),
        ];

        let mut start = ram.start;
        for (limit, zone) in limits {
            let end = PAddr::new(limit).min(ram.end).max(start);
            if start < end {
                let linear = phys_to_kseg0(start).ok().filter(|_| zone != Zone::HighMem);
                let region = Region {
                    phys: start..end,
                    zone,
                    linear,
                };
                if map.add(region).is_err() {
                    log::warn!("memory map full, dropping a region");
                }
            }
            start = end;
        }
        map
    }

    /// The layout of the configured board.
    pub fn board() -> Self {
        let ram = PAddr::new(config::RAM_START)..PAddr::new(config::RAM_END);
        Self::kseg0(ram, ZoneConfig::default())
    }

    /// Add a region, returning it back if it overlaps another one or the map
    /// is full.
    pub fn add(&mut self, region: Region) -> Result<(), Region> {
        let overlaps = self.regions.iter().any(|r| {
            r.phys.start < region.phys.end && region.phys.start < r.phys.end
        });
        if overlaps || region.phys.start >= region.phys.end {
            return Err(region);
        }
        self.regions.push(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> + '_ {
        self.regions.iter()
    }

    pub fn region_of(&self, paddr: PAddr) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(paddr))
    }

    pub fn zone_of(&self, paddr: PAddr) -> Option<Zone> {
        self.region_of(paddr).map(|r| r.zone)
    }

    /// The permanent cached mapping of `paddr`, if there is one.
    pub fn phys_to_virt(&self, paddr: PAddr) -> Option<LAddr> {
        let region = self.region_of(paddr)?;
        let base = region.linear?;
        Some(base + (paddr.val() - region.phys.start.val()))
    }

    pub fn virt_to_phys(&self, laddr: LAddr) -> Option<PAddr> {
        self.regions.iter().find_map(|r| {
            let range = r.linear_range()?;
            range
                .contains(&laddr)
                .then(|| r.phys.start + (laddr.val() - range.start.val()))
        })
    }

    pub fn page_address(&self, page: Page) -> Option<LAddr> {
        self.phys_to_virt(page.base())
    }

    pub fn is_highmem(&self, page: Page) -> bool {
        self.region_of(page.base())
            .map_or(false, |r| r.linear.is_none())
    }
}
