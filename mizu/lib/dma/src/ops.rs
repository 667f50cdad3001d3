use kmem::{GfpFlags, Page, PageAlloc, ZoneConfig};
use mips_paging::{BusAddr, DmaMask, LAddr};
use spin::Once;

use crate::{
    cache::Synchronizer,
    coherence::Classifier,
    debug::DebugRegistry,
    platform::{board_alias, Alias, Platform},
    Coherent, Device, Direction, Error, Noncoherent, ScatterEntry,
};

/// What device drivers call to move data between memory and devices.
pub trait DmaOps: Send + Sync {
    fn alloc_coherent(&self, dev: &Device, size: usize, gfp: GfpFlags) -> Result<Coherent, Error>;

    fn free_coherent(&self, dev: &Device, buf: Coherent);

    fn alloc_noncoherent(
        &self,
        dev: &Device,
        size: usize,
        gfp: GfpFlags,
    ) -> Result<Noncoherent, Error>;

    fn free_noncoherent(&self, dev: &Device, buf: Noncoherent);

    /// Hand a range of a [`Noncoherent`] buffer over in `dir`.
    fn cache_sync(&self, dev: &Device, vaddr: LAddr, size: usize, dir: Direction);

    /// Give `size` bytes at `offset` into `page` to the device. Failure is
    /// reported through [`mapping_error`](DmaOps::mapping_error).
    fn map_page(&self, dev: &Device, page: Page, offset: usize, size: usize, dir: Direction)
        -> BusAddr;

    /// Like [`map_page`](DmaOps::map_page) for a range with a permanent
    /// kernel mapping.
    fn map_single(&self, dev: &Device, vaddr: LAddr, size: usize, dir: Direction) -> BusAddr;

    fn unmap_page(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction);

    fn unmap_single(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        self.unmap_page(dev, bus, size, dir)
    }

    /// Map every entry of `sg` in order, returning how many were mapped.
    ///
    /// If an entry cannot be mapped, the ones before it are unmapped again
    /// and nothing stays mapped.
    fn map_sg(&self, dev: &Device, sg: &mut [ScatterEntry], dir: Direction)
        -> Result<usize, Error>;

    fn unmap_sg(&self, dev: &Device, sg: &mut [ScatterEntry], dir: Direction);

    fn sync_single_for_cpu(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction);

    fn sync_single_for_device(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction);

    fn sync_sg_for_cpu(&self, dev: &Device, sg: &[ScatterEntry], dir: Direction);

    fn sync_sg_for_device(&self, dev: &Device, sg: &[ScatterEntry], dir: Direction);

    fn mapping_error(&self, dev: &Device, bus: BusAddr) -> bool;

    fn dma_supported(&self, dev: &Device, mask: DmaMask) -> bool;
}

/// DMA for MIPS cores without guaranteed cache coherency.
pub struct DefaultOps<'a> {
    pub(crate) platform: &'a dyn Platform,
    pub(crate) pages: &'a dyn PageAlloc,
    pub(crate) sync: Synchronizer<'a>,
    pub(crate) alias: &'a dyn Alias,
    pub(crate) classifier: Classifier,
    pub(crate) zones: ZoneConfig,
    pub(crate) debug: Option<&'a DebugRegistry>,
}

impl<'a> DefaultOps<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        pages: &'a dyn PageAlloc,
        sync: Synchronizer<'a>,
        classifier: Classifier,
    ) -> Self {
        DefaultOps {
            platform,
            pages,
            sync,
            alias: board_alias(),
            classifier,
            zones: ZoneConfig::default(),
            debug: None,
        }
    }

    pub fn with_alias(mut self, alias: &'a dyn Alias) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_zone_config(mut self, zones: ZoneConfig) -> Self {
        self.zones = zones;
        self
    }

    /// Check every call against a registry of live mappings.
    pub fn with_debug(mut self, debug: &'a DebugRegistry) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    fn needs_sync(&self, dev: &Device) -> bool {
        self.classifier.needs_sync(self.platform, dev)
    }

    /// Give the CPU back a range the device may have written.
    #[track_caller]
    fn sync_for_cpu(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        if self.needs_sync(dev) && dir != Direction::ToDevice {
            let Some(paddr) = self.platform.to_phys(dev, bus) else {
                panic!("{}: {bus:?} was never mapped", dev.name());
            };
            self.sync
                .sync_page(Page::containing(paddr), paddr.in_page_offset(), size, dir);
        }
    }
}

impl DmaOps for DefaultOps<'_> {
    fn alloc_coherent(&self, dev: &Device, size: usize, gfp: GfpFlags) -> Result<Coherent, Error> {
        self.alloc_coherent_impl(dev, size, gfp)
    }

    fn free_coherent(&self, dev: &Device, buf: Coherent) {
        self.free_coherent_impl(dev, buf)
    }

    fn alloc_noncoherent(
        &self,
        dev: &Device,
        size: usize,
        gfp: GfpFlags,
    ) -> Result<Noncoherent, Error> {
        self.alloc_noncoherent_impl(dev, size, gfp)
    }

    fn free_noncoherent(&self, dev: &Device, buf: Noncoherent) {
        self.free_noncoherent_impl(dev, buf)
    }

    fn cache_sync(&self, dev: &Device, vaddr: LAddr, size: usize, dir: Direction) {
        self.cache_sync_impl(dev, vaddr, size, dir)
    }

    fn map_page(
        &self,
        dev: &Device,
        page: Page,
        offset: usize,
        size: usize,
        dir: Direction,
    ) -> BusAddr {
        dir.check();
        if self.needs_sync(dev) {
            self.sync.sync_page(page, offset, size, dir);
        }
        let bus = self.platform.map(dev, page.base() + offset, size);
        if self.platform.mapping_error(dev, bus) {
            log::debug!(
                "{}: cannot map {:?}+{size:#x}",
                dev.name(),
                page.base() + offset
            );
            return bus;
        }
        if let Some(debug) = self.debug {
            debug.map(dev, bus, size, dir);
        }
        log::trace!("{}: map {bus:?}+{size:#x} {dir:?}", dev.name());
        bus
    }

    fn map_single(&self, dev: &Device, vaddr: LAddr, size: usize, dir: Direction) -> BusAddr {
        dir.check();
        match self.sync.memmap().virt_to_phys(vaddr) {
            Some(paddr) => self.map_page(
                dev,
                Page::containing(paddr),
                paddr.in_page_offset(),
                size,
                dir,
            ),
            None => {
                log::debug!("{}: {vaddr:?} is not linearly mapped", dev.name());
                BusAddr::ERROR
            }
        }
    }

    fn unmap_page(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        dir.check();
        if let Some(debug) = self.debug {
            debug.unmap(dev, bus, size, dir);
        }
        self.sync_for_cpu(dev, bus, size, dir);
        self.platform.unmap(dev, bus, size, dir);
        log::trace!("{}: unmap {bus:?}+{size:#x} {dir:?}", dev.name());
    }

    fn map_sg(
        &self,
        dev: &Device,
        sg: &mut [ScatterEntry],
        dir: Direction,
    ) -> Result<usize, Error> {
        dir.check();
        for index in 0..sg.len() {
            let entry = &mut sg[index];
            let bus = self.map_page(dev, entry.page, entry.offset, entry.length, dir);
            if self.platform.mapping_error(dev, bus) {
                log::debug!("{}: scatter entry {index} unmappable, unwinding", dev.name());
                self.unmap_sg(dev, &mut sg[..index], dir);
                return Err(Error::Unmappable { index });
            }
            entry.dma_address = bus;
            entry.dma_length = entry.length;
        }
        Ok(sg.len())
    }

    fn unmap_sg(&self, dev: &Device, sg: &mut [ScatterEntry], dir: Direction) {
        for entry in sg {
            self.unmap_page(dev, entry.dma_address, entry.dma_length, dir);
            entry.dma_address = BusAddr::ERROR;
            entry.dma_length = 0;
        }
    }

    fn sync_single_for_cpu(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        dir.check();
        if let Some(debug) = self.debug {
            debug.sync(dev, bus, size, dir);
        }
        self.sync_for_cpu(dev, bus, size, dir)
    }

    fn sync_single_for_device(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        dir.check();
        if let Some(debug) = self.debug {
            debug.sync(dev, bus, size, dir);
        }
        self.platform.extra_sync_for_device(dev);
        if self.needs_sync(dev) {
            let Some(paddr) = self.platform.to_phys(dev, bus) else {
                panic!("{}: {bus:?} was never mapped", dev.name());
            };
            self.sync
                .sync_page(Page::containing(paddr), paddr.in_page_offset(), size, dir);
        }
    }

    fn sync_sg_for_cpu(&self, dev: &Device, sg: &[ScatterEntry], dir: Direction) {
        dir.check();
        for entry in sg {
            if let Some(debug) = self.debug {
                debug.sync(dev, entry.dma_address, entry.dma_length, dir);
            }
            if self.needs_sync(dev) && dir != Direction::ToDevice {
                self.sync
                    .sync_page(entry.page, entry.offset, entry.dma_length, dir);
            }
        }
    }

    fn sync_sg_for_device(&self, dev: &Device, sg: &[ScatterEntry], dir: Direction) {
        dir.check();
        self.platform.extra_sync_for_device(dev);
        for entry in sg {
            if let Some(debug) = self.debug {
                debug.sync(dev, entry.dma_address, entry.dma_length, dir);
            }
            if self.needs_sync(dev) {
                self.sync
                    .sync_page(entry.page, entry.offset, entry.dma_length, dir);
            }
        }
    }

    fn mapping_error(&self, dev: &Device, bus: BusAddr) -> bool {
        self.platform.mapping_error(dev, bus)
    }

    fn dma_supported(&self, dev: &Device, mask: DmaMask) -> bool {
        self.platform.dma_supported(dev, mask)
    }
}

static OPS: Once<&'static dyn DmaOps> = Once::new();

/// Install the operations every later [`ops`] call returns.
///
/// Only the first call takes effect.
pub fn init_ops(ops: &'static dyn DmaOps) {
    OPS.call_once(|| ops);
}

/// # Panics
///
/// Panics if [`init_ops`] has not been called.
pub fn ops() -> &'static dyn DmaOps {
    match OPS.get() {
        Some(ops) => *ops,
        None => panic!("DMA operations used before `init_ops`"),
    }
}
