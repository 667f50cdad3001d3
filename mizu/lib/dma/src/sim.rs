//! A write-back data cache over host memory, and a machine to run it in.
//!
//! CPU accesses go through the simulated cache unless they fall into an
//! uncached alias; device accesses always hit memory. Missing maintenance
//! shows up as stale or lost data.

use std::{
    collections::BTreeMap,
    ops::Range,
    ptr,
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Mutex,
    },
};

use kmem::{Kmap, KmapWindow, MemMap, Page, Region, Zone, ZoneConfig, Zones, PAGE_SIZE};
use mips_paging::{BusAddr, LAddr, PAddr};

use crate::{
    cache::{CacheOps, Synchronizer},
    coherence::{Classifier, CpuType},
    debug::DebugRegistry,
    ops::DefaultOps,
    platform::{Alias, Platform},
    Device,
};

const LINE: usize = config::DCACHE_LINE_SIZE;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Wback,
    Inv,
    WbackInv,
}

struct Line {
    data: [u8; LINE],
    dirty: bool,
}

#[derive(Default)]
struct Inner {
    lines: BTreeMap<usize, Line>,
    uncached: Vec<Range<usize>>,
    log: Vec<(Op, Range<LAddr>)>,
}

impl Inner {
    fn is_uncached(&self, addr: usize) -> bool {
        self.uncached.iter().any(|r| r.contains(&addr))
    }

    fn line(&mut self, base: usize) -> &mut Line {
        self.lines.entry(base).or_insert_with(|| {
            let mut data = [0; LINE];
            unsafe { ptr::copy_nonoverlapping(base as *const u8, data.as_mut_ptr(), LINE) };
            Line { data, dirty: false }
        })
    }

    fn overlapping(&self, range: &Range<LAddr>) -> Vec<usize> {
        let start = range.start.val() & !(LINE - 1);
        self.lines.range(start..range.end.val()).map(|(&base, _)| base).collect()
    }

    fn write_back(&mut self, base: usize) {
        if let Some(line) = self.lines.get_mut(&base) {
            if line.dirty {
                unsafe { ptr::copy_nonoverlapping(line.data.as_ptr(), base as *mut u8, LINE) };
                line.dirty = false;
            }
        }
    }
}

#[derive(Default)]
pub struct SimCache {
    inner: Mutex<Inner>,
}

impl SimCache {
    pub fn cpu_write(&self, addr: LAddr, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        for (i, &byte) in data.iter().enumerate() {
            let addr = addr.val() + i;
            if inner.is_uncached(addr) {
                assert!(
                    !inner.lines.contains_key(&(addr & !(LINE - 1))),
                    "cached line under an uncached access at {addr:#x}"
                );
                unsafe { *(addr as *mut u8) = byte };
            } else {
                let line = inner.line(addr & !(LINE - 1));
                line.data[addr % LINE] = byte;
                line.dirty = true;
            }
        }
    }

    pub fn cpu_read(&self, addr: LAddr, len: usize) -> Vec<u8> {
        let mut inner = self.inner.lock().unwrap();
        (0..len)
            .map(|i| {
                let addr = addr.val() + i;
                if inner.is_uncached(addr) {
                    assert!(
                        !inner.lines.contains_key(&(addr & !(LINE - 1))),
                        "cached line under an uncached access at {addr:#x}"
                    );
                    unsafe { *(addr as *const u8) }
                } else {
                    inner.line(addr & !(LINE - 1)).data[addr % LINE]
                }
            })
            .collect()
    }

    pub fn device_write(&self, addr: LAddr, data: &[u8]) {
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), *addr, data.len()) }
    }

    pub fn device_read(&self, addr: LAddr, len: usize) -> Vec<u8> {
        unsafe { LAddr::as_slice(addr.to_range(len)) }.to_vec()
    }

    /// Lines written back and dropped as if by capacity misses.
    pub fn evict_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        let bases = inner.lines.keys().copied().collect::<Vec<_>>();
        bases.into_iter().for_each(|base| inner.write_back(base));
        inner.lines.clear();
    }

    pub fn cached_lines(&self, range: Range<LAddr>) -> usize {
        self.inner.lock().unwrap().overlapping(&range).len()
    }

    pub fn take_log(&self) -> Vec<(Op, Range<LAddr>)> {
        std::mem::take(&mut self.inner.lock().unwrap().log)
    }
}

impl CacheOps for SimCache {
    unsafe fn wback(&self, range: Range<LAddr>) {
        let mut inner = self.inner.lock().unwrap();
        for base in inner.overlapping(&range) {
            inner.write_back(base);
        }
        inner.log.push((Op::Wback, range));
    }

    unsafe fn inv(&self, range: Range<LAddr>) {
        let mut inner = self.inner.lock().unwrap();
        for base in inner.overlapping(&range) {
            let partial = base < range.start.val() || base + LINE > range.end.val();
            if partial {
                inner.write_back(base);
            }
            inner.lines.remove(&base);
        }
        inner.log.push((Op::Inv, range));
    }

    unsafe fn wback_inv(&self, range: Range<LAddr>) {
        let mut inner = self.inner.lock().unwrap();
        for base in inner.overlapping(&range) {
            inner.write_back(base);
            inner.lines.remove(&base);
        }
        inner.log.push((Op::WbackInv, range));
    }
}

/// Uncached aliases share the address of the cached view; the simulator
/// bypasses its lines for them instead.
impl Alias for SimCache {
    fn uncached(&self, cached: LAddr, size: usize) -> Option<LAddr> {
        let mut inner = self.inner.lock().unwrap();
        let range = cached.to_range(size);
        assert!(
            inner.overlapping(&range).is_empty(),
            "cached lines under a new uncached alias"
        );
        inner.uncached.push(cached.val()..cached.val() + size);
        Some(cached)
    }

    fn cached(&self, uncached: LAddr, size: usize) -> LAddr {
        let mut inner = self.inner.lock().unwrap();
        let range = uncached.val()..uncached.val() + size;
        match inner.uncached.iter().position(|r| *r == range) {
            Some(index) => {
                inner.uncached.swap_remove(index);
                uncached
            }
            None => panic!("not an uncached alias: {uncached:?}"),
        }
    }
}

#[repr(align(4096))]
struct Memory<const N: usize>([[u8; PAGE_SIZE]; N]);

pub fn leak_pages<const N: usize>() -> LAddr {
    let memory = Box::leak(Box::new(Memory::<N>([[0; PAGE_SIZE]; N])));
    LAddr::from(memory.0.as_mut_ptr())
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Maps high memory pages onto a host block, always on context 0.
pub struct HostKmap {
    phys: Range<PAddr>,
    host: LAddr,
    maps: AtomicUsize,
}

impl HostKmap {
    pub fn maps(&self) -> usize {
        self.maps.load(SeqCst)
    }

    pub fn host_of(&self, paddr: PAddr) -> LAddr {
        assert!(self.phys.contains(&paddr));
        self.host + (paddr.val() - self.phys.start.val())
    }
}

unsafe impl Kmap for HostKmap {
    fn context(&self) -> usize {
        0
    }

    unsafe fn map(&self, _: usize, page: Page) -> LAddr {
        self.maps.fetch_add(1, SeqCst);
        self.host_of(page.base())
    }

    unsafe fn unmap(&self, _: usize, _: LAddr) {}
}

pub const DMA_BASE: usize = 0x0010_0000;
pub const DMA_PAGES: usize = 16;
pub const DMA32_BASE: usize = 0x8000_0000;
pub const DMA32_PAGES: usize = 8;
pub const LOWMEM_BASE: usize = 0x1_0000_0000;
pub const LOWMEM_PAGES: usize = 16;
pub const HIGHMEM_BASE: usize = 0x2_0000_0000;
pub const HIGHMEM_PAGES: usize = 8;

/// A small machine: optional DMA and DMA32 zones, a normal zone above 4 GiB
/// and some high memory, all backed by host memory.
pub struct Fixture {
    pub zones: &'static Zones,
    pub zone_config: ZoneConfig,
    pub kmap: &'static HostKmap,
    pub window: &'static KmapWindow<'static>,
    pub cache: &'static SimCache,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_zones(ZoneConfig {
            has_dma: true,
            has_dma32: false,
        })
    }

    pub fn with_zones(zone_config: ZoneConfig) -> Self {
        klog::init_logger(log::Level::Debug);

        let mut map = MemMap::new();
        let mut add = |base: usize, pages: usize, zone, linear| {
            let region = Region {
                phys: PAddr::new(base)..PAddr::new(base + pages * PAGE_SIZE),
                zone,
                linear,
            };
            map.add(region).unwrap();
        };
        if zone_config.has_dma {
            add(DMA_BASE, DMA_PAGES, Zone::Dma, Some(leak_pages::<DMA_PAGES>()));
        }
        if zone_config.has_dma32 {
            add(DMA32_BASE, DMA32_PAGES, Zone::Dma32, Some(leak_pages::<DMA32_PAGES>()));
        }
        add(LOWMEM_BASE, LOWMEM_PAGES, Zone::Normal, Some(leak_pages::<LOWMEM_PAGES>()));
        add(HIGHMEM_BASE, HIGHMEM_PAGES, Zone::HighMem, None);

        let kmap = leak(HostKmap {
            phys: PAddr::new(HIGHMEM_BASE)..PAddr::new(HIGHMEM_BASE + HIGHMEM_PAGES * PAGE_SIZE),
            host: leak_pages::<HIGHMEM_PAGES>(),
            maps: AtomicUsize::new(0),
        });
        Fixture {
            zones: leak(unsafe { Zones::new(map) }),
            zone_config,
            kmap,
            window: leak(KmapWindow::new(kmap)),
            cache: leak(SimCache::default()),
        }
    }

    pub fn memmap(&self) -> &'static MemMap {
        self.zones.memmap()
    }

    pub fn synchronizer(&self) -> Synchronizer<'static> {
        Synchronizer::new(self.cache, self.memmap(), self.window)
    }

    pub fn linear(&self, paddr: PAddr) -> LAddr {
        self.memmap().phys_to_virt(paddr).unwrap()
    }

    /// Where the host backs `paddr`, linear or not.
    pub fn host(&self, paddr: PAddr) -> LAddr {
        match self.memmap().phys_to_virt(paddr) {
            Some(laddr) => laddr,
            None => self.kmap.host_of(paddr),
        }
    }

    pub fn bus_host(&self, platform: &dyn Platform, dev: &Device, bus: BusAddr) -> LAddr {
        self.host(platform.to_phys(dev, bus).unwrap())
    }

    pub fn ops(&self, platform: &'static dyn Platform, cpu: CpuType) -> DefaultOps<'static> {
        DefaultOps::new(
            platform,
            self.zones,
            self.synchronizer(),
            Classifier::new(cpu),
        )
        .with_alias(self.cache)
        .with_zone_config(self.zone_config)
    }

    pub fn debug_ops(
        &self,
        platform: &'static dyn Platform,
        cpu: CpuType,
    ) -> (DefaultOps<'static>, &'static DebugRegistry) {
        let registry = leak(DebugRegistry::new());
        (self.ops(platform, cpu).with_debug(registry), registry)
    }
}
