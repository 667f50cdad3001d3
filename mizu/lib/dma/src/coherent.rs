//! Buffers shared with a device for their whole lifetime.
//!
//! Coherent buffers of devices that need cache maintenance are written back
//! and invalidated once, then handed out through their uncached alias, so no
//! later synchronization is ever needed.

use kmem::{GfpFlags, ZoneConfig};
use mips_paging::{checked_order, BusAddr, DmaMask, LAddr, PAddr};

use crate::{DefaultOps, Device, Direction, Error};

#[derive(Debug)]
struct Block {
    paddr: PAddr,
    order: u32,
    size: usize,
    bus: BusAddr,
}

/// A buffer both the CPU and the device may access at any time.
///
/// Only [`DmaOps::alloc_coherent`](crate::DmaOps::alloc_coherent) creates
/// one, and it must be given back to
/// [`DmaOps::free_coherent`](crate::DmaOps::free_coherent).
#[derive(Debug)]
#[must_use = "coherent buffers must be freed with `free_coherent`"]
pub struct Coherent {
    block: Block,
    vaddr: LAddr,
    uncached: bool,
}

impl Coherent {
    /// The CPU address of the buffer.
    pub fn vaddr(&self) -> LAddr {
        self.vaddr
    }

    /// The address the device uses for the buffer.
    pub fn bus(&self) -> BusAddr {
        self.block.bus
    }

    pub fn size(&self) -> usize {
        self.block.size
    }

    /// Whether the CPU reaches the buffer around its caches.
    pub fn is_uncached(&self) -> bool {
        self.uncached
    }

    /// # Safety
    ///
    /// The device may write the buffer concurrently.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        LAddr::as_mut_slice(self.vaddr.to_range(self.block.size))
    }
}

/// A cached buffer the caller keeps coherent with
/// [`DmaOps::cache_sync`](crate::DmaOps::cache_sync).
#[derive(Debug)]
#[must_use = "non-coherent buffers must be freed with `free_noncoherent`"]
pub struct Noncoherent {
    block: Block,
    vaddr: LAddr,
}

impl Noncoherent {
    pub fn vaddr(&self) -> LAddr {
        self.vaddr
    }

    pub fn bus(&self) -> BusAddr {
        self.block.bus
    }

    pub fn size(&self) -> usize {
        self.block.size
    }
}

/// The zone a device with `mask` can allocate from.
fn zone_flags(zones: ZoneConfig, mask: DmaMask) -> GfpFlags {
    let limited = mask < DmaMask::FULL;
    if zones.has_dma && zones.has_dma32 && mask < DmaMask::bits(32) {
        GfpFlags::DMA
    } else if zones.has_dma32 && limited {
        GfpFlags::DMA32
    } else if zones.has_dma && limited {
        GfpFlags::DMA
    } else {
        GfpFlags::empty()
    }
}

/// Replace the caller's zone choice with the device's, and never reclaim.
pub(crate) fn massage_gfp(zones: ZoneConfig, mask: DmaMask, gfp: GfpFlags) -> GfpFlags {
    gfp.difference(GfpFlags::ZONE_MASK) | GfpFlags::NORETRY | zone_flags(zones, mask)
}

impl DefaultOps<'_> {
    fn alloc_block(&self, dev: &Device, size: usize, gfp: GfpFlags) -> Result<(Block, LAddr), Error> {
        let gfp = massage_gfp(self.zones, dev.coherent_dma_mask(), gfp) | GfpFlags::ZERO;
        let order = checked_order(size).map_err(|_| Error::OutOfMemory)?;
        let paddr = self.pages.alloc_pages(gfp, order).ok_or(Error::OutOfMemory)?;

        let free = |err| {
            unsafe { self.pages.free_pages(paddr, order) };
            Err(err)
        };
        let Some(vaddr) = self.sync.memmap().phys_to_virt(paddr) else {
            return free(Error::Unaddressable);
        };

        let bus = self.platform.map(dev, paddr, size);
        if self.platform.mapping_error(dev, bus) {
            log::debug!("{}: {paddr:?} has no bus address", dev.name());
            return free(Error::Unaddressable);
        }
        if !dev.coherent_dma_mask().covers(bus, size) {
            log::debug!(
                "{}: {bus:?} out of {:?}",
                dev.name(),
                dev.coherent_dma_mask()
            );
            self.platform.unmap(dev, bus, size, Direction::Bidirectional);
            return free(Error::Unaddressable);
        }

        let block = Block {
            paddr,
            order,
            size,
            bus,
        };
        Ok((block, vaddr))
    }

    fn free_block(&self, dev: &Device, block: Block) {
        self.platform
            .unmap(dev, block.bus, block.size, Direction::Bidirectional);
        unsafe { self.pages.free_pages(block.paddr, block.order) }
    }

    pub(crate) fn alloc_coherent_impl(
        &self,
        dev: &Device,
        size: usize,
        gfp: GfpFlags,
    ) -> Result<Coherent, Error> {
        let (block, cached) = self.alloc_block(dev, size, gfp)?;

        let (vaddr, uncached) = if self.classifier.needs_sync(self.platform, dev) {
            self.sync.sync_virtual(cached, size, Direction::Bidirectional);
            match self.alias.uncached(cached, size) {
                Some(uncached) => (uncached, true),
                None => {
                    log::debug!("{}: {cached:?} has no uncached alias", dev.name());
                    self.free_block(dev, block);
                    return Err(Error::Unaddressable);
                }
            }
        } else {
            (cached, false)
        };

        if let Some(debug) = self.debug {
            debug.alloc_coherent(dev, block.bus, size);
        }
        log::trace!(
            "{}: coherent {size:#x} bytes at {vaddr:?}, {:?}",
            dev.name(),
            block.bus
        );
        Ok(Coherent {
            block,
            vaddr,
            uncached,
        })
    }

    pub(crate) fn free_coherent_impl(&self, dev: &Device, buf: Coherent) {
        let Coherent {
            block,
            vaddr,
            uncached,
        } = buf;
        if let Some(debug) = self.debug {
            debug.free_coherent(dev, block.bus, block.size);
        }
        if uncached {
            let cached = self.alias.cached(vaddr, block.size);
            debug_assert_eq!(self.sync.memmap().phys_to_virt(block.paddr), Some(cached));
        }
        log::trace!("{}: free coherent {:?}", dev.name(), block.bus);
        self.free_block(dev, block)
    }

    pub(crate) fn alloc_noncoherent_impl(
        &self,
        dev: &Device,
        size: usize,
        gfp: GfpFlags,
    ) -> Result<Noncoherent, Error> {
        let (block, vaddr) = self.alloc_block(dev, size, gfp)?;
        if let Some(debug) = self.debug {
            debug.alloc_coherent(dev, block.bus, size);
        }
        Ok(Noncoherent { block, vaddr })
    }

    pub(crate) fn free_noncoherent_impl(&self, dev: &Device, buf: Noncoherent) {
        if let Some(debug) = self.debug {
            debug.free_coherent(dev, buf.block.bus, buf.block.size);
        }
        self.free_block(dev, buf.block)
    }

    pub(crate) fn cache_sync_impl(&self, dev: &Device, vaddr: LAddr, size: usize, dir: Direction) {
        dir.check();
        self.platform.extra_sync_for_device(dev);
        if self.classifier.needs_sync(self.platform, dev) {
            self.sync.sync_virtual(vaddr, size, dir);
        }
    }
}
