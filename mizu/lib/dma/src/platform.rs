//! Platform policy: how CPU physical addresses appear on the bus, which
//! devices are coherent, and how the CPU reaches memory uncached.

use core::ops::Range;

use mips_paging::{cac_addr, uncac_addr, BusAddr, DmaMask, LAddr, PAddr};

use crate::{Device, Direction};

/// A pure mapping between CPU physical and bus addresses.
///
/// `to_phys(to_bus(p)?)` must give back `p` for every `p` it accepts.
pub trait Translate: Send + Sync {
    fn to_bus(&self, paddr: PAddr) -> Option<BusAddr>;

    fn to_phys(&self, bus: BusAddr) -> Option<PAddr>;
}

/// Bus addresses equal physical addresses.
#[derive(Copy, Clone, Debug, Default)]
pub struct Identity;

impl Translate for Identity {
    fn to_bus(&self, paddr: PAddr) -> Option<BusAddr> {
        Some(BusAddr::new(paddr.val() as u64))
    }

    fn to_phys(&self, bus: BusAddr) -> Option<PAddr> {
        usize::try_from(bus.val()).ok().map(PAddr::new)
    }
}

/// Memory appears on the bus at a fixed offset from its physical address.
#[derive(Copy, Clone, Debug)]
pub struct Offset {
    offset: u64,
}

impl Offset {
    pub const fn new(offset: u64) -> Self {
        Offset { offset }
    }
}

impl Translate for Offset {
    fn to_bus(&self, paddr: PAddr) -> Option<BusAddr> {
        let bus = (paddr.val() as u64).checked_add(self.offset)?;
        (bus != BusAddr::ERROR.val()).then(|| BusAddr::new(bus))
    }

    fn to_phys(&self, bus: BusAddr) -> Option<PAddr> {
        let paddr = bus.val().checked_sub(self.offset)?;
        usize::try_from(paddr).ok().map(PAddr::new)
    }
}

pub const MAX_WINDOWS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    pub phys: Range<PAddr>,
    pub bus: BusAddr,
}

impl Window {
    fn size(&self) -> usize {
        self.phys.end.val() - self.phys.start.val()
    }

    fn bus_contains(&self, bus: BusAddr) -> bool {
        bus.val()
            .checked_sub(self.bus.val())
            .map_or(false, |off| off < self.size() as u64)
    }
}

/// Only physical memory inside one of the windows is visible to devices, each
/// window at its own bus base.
#[derive(Clone, Debug, Default)]
pub struct Windows {
    windows: heapless::Vec<Window, MAX_WINDOWS>,
}

impl Windows {
    pub const fn new() -> Self {
        Windows {
            windows: heapless::Vec::new(),
        }
    }

    /// Add a window, returning it back if it overlaps another one on either
    /// side or the table is full.
    pub fn add(&mut self, window: Window) -> Result<(), Window> {
        if window.phys.start >= window.phys.end {
            return Err(window);
        }
        let Some(bus_end) = window.bus.val().checked_add(window.size() as u64) else {
            return Err(window);
        };
        let overlaps = self.windows.iter().any(|w| {
            let phys = w.phys.start < window.phys.end && window.phys.start < w.phys.end;
            let bus = w.bus.val() < bus_end && window.bus.val() < w.bus.val() + w.size() as u64;
            phys || bus
        });
        if overlaps {
            return Err(window);
        }
        self.windows.push(window)
    }
}

impl Translate for Windows {
    fn to_bus(&self, paddr: PAddr) -> Option<BusAddr> {
        let window = self.windows.iter().find(|w| w.phys.contains(&paddr))?;
        Some(window.bus + (paddr.val() - window.phys.start.val()))
    }

    fn to_phys(&self, bus: BusAddr) -> Option<PAddr> {
        let window = self.windows.iter().find(|w| w.bus_contains(bus))?;
        Some(window.phys.start + (bus.val() - window.bus.val()) as usize)
    }
}

/// The platform services the DMA layer relies on.
pub trait Platform: Send + Sync {
    /// Whether the hardware keeps caches coherent with `dev`'s transfers.
    /// Undeclared devices are not.
    fn device_is_coherent(&self, dev: &Device) -> bool {
        dev.declared_coherent().unwrap_or(false)
    }

    /// Bus address of `[paddr, paddr + size)` for `dev`, or
    /// [`BusAddr::ERROR`].
    fn map(&self, dev: &Device, paddr: PAddr, size: usize) -> BusAddr;

    /// Release whatever `map` set up.
    fn unmap(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        let _ = (dev, bus, size, dir);
    }

    fn to_phys(&self, dev: &Device, bus: BusAddr) -> Option<PAddr>;

    fn mapping_error(&self, dev: &Device, bus: BusAddr) -> bool {
        let _ = dev;
        bus.is_error()
    }

    fn dma_supported(&self, dev: &Device, mask: DmaMask) -> bool;

    /// Runs before every device-bound synchronization, coherent or not.
    fn extra_sync_for_device(&self, dev: &Device) {
        let _ = dev;
    }
}

/// Narrower masks cannot even reach the DMA zone.
const MIN_DMA_MASK: DmaMask = DmaMask::bits(24);

/// A platform whose bus view of memory is described by a [`Translate`].
pub struct GenericPlatform<T> {
    translate: T,
    coherentio: bool,
    extra_sync: Option<fn(&Device)>,
}

impl<T: Translate> GenericPlatform<T> {
    pub const fn new(translate: T) -> Self {
        GenericPlatform {
            translate,
            coherentio: false,
            extra_sync: None,
        }
    }

    /// Treat every device as coherent, as on systems with an I/O coherence
    /// unit.
    pub const fn with_coherentio(mut self, coherentio: bool) -> Self {
        self.coherentio = coherentio;
        self
    }

    pub const fn with_extra_sync(mut self, hook: fn(&Device)) -> Self {
        self.extra_sync = Some(hook);
        self
    }

    pub fn translate(&self) -> &T {
        &self.translate
    }
}

impl<T: Translate> Platform for GenericPlatform<T> {
    fn device_is_coherent(&self, dev: &Device) -> bool {
        self.coherentio || dev.declared_coherent().unwrap_or(false)
    }

    fn map(&self, dev: &Device, paddr: PAddr, size: usize) -> BusAddr {
        let Some(bus) = self.translate.to_bus(paddr) else {
            return BusAddr::ERROR;
        };
        if let Some(len) = size.checked_sub(1) {
            // The whole range must stay contiguous on the bus.
            let last = paddr.checked_add(len).and_then(|p| self.translate.to_bus(p));
            if last.is_none() || last != bus.checked_add(len) {
                return BusAddr::ERROR;
            }
        }
        if !dev.dma_mask().covers(bus, size) {
            return BusAddr::ERROR;
        }
        bus
    }

    fn to_phys(&self, _: &Device, bus: BusAddr) -> Option<PAddr> {
        self.translate.to_phys(bus)
    }

    fn dma_supported(&self, _: &Device, mask: DmaMask) -> bool {
        mask >= MIN_DMA_MASK
    }

    fn extra_sync_for_device(&self, dev: &Device) {
        if let Some(hook) = self.extra_sync {
            hook(dev)
        }
    }
}

/// The uncached CPU view of memory that also has a cached kernel mapping.
pub trait Alias: Send + Sync {
    /// The uncached alias of the cached range at `cached`, if it has one.
    fn uncached(&self, cached: LAddr, size: usize) -> Option<LAddr>;

    /// The cached address behind an alias returned by
    /// [`uncached`](Alias::uncached).
    ///
    /// # Panics
    ///
    /// Panics if `uncached` is not such an alias.
    fn cached(&self, uncached: LAddr, size: usize) -> LAddr;
}

/// KSEG0 memory is reached uncached through KSEG1.
#[derive(Copy, Clone, Debug, Default)]
pub struct Kseg1;

impl Alias for Kseg1 {
    fn uncached(&self, cached: LAddr, _: usize) -> Option<LAddr> {
        uncac_addr(cached).ok()
    }

    fn cached(&self, uncached: LAddr, _: usize) -> LAddr {
        match cac_addr(uncached) {
            Ok(cached) => cached,
            Err(err) => panic!("not an uncached alias: {err:?}"),
        }
    }
}

impl<A: Alias + ?Sized> Alias for &A {
    fn uncached(&self, cached: LAddr, size: usize) -> Option<LAddr> {
        (**self).uncached(cached, size)
    }

    fn cached(&self, uncached: LAddr, size: usize) -> LAddr {
        (**self).cached(uncached, size)
    }
}

/// RAM mirrored right above itself, reached uncached through the mirror.
///
/// MT7621 boards with less than 512 MiB of RAM override the cache attribute
/// of the low region to write-through; going through the mirror avoids it.
/// The mirror itself is reached through `inner`, KSEG1 on real hardware.
#[derive(Copy, Clone, Debug)]
pub struct Shadow<A = Kseg1> {
    offset: usize,
    inner: A,
}

impl Shadow {
    pub const fn new(offset: usize) -> Self {
        Shadow::over(Kseg1, offset)
    }

    /// The shadow of the configured board, if it has one.
    pub const fn board() -> Option<Self> {
        match config::UNCACHED_SHADOW {
            Some(offset) => Some(Shadow::new(offset)),
            None => None,
        }
    }
}

impl<A> Shadow<A> {
    pub const fn over(inner: A, offset: usize) -> Self {
        Shadow { offset, inner }
    }
}

impl<A: Alias> Alias for Shadow<A> {
    fn uncached(&self, cached: LAddr, size: usize) -> Option<LAddr> {
        self.inner.uncached(cached + self.offset, size)
    }

    fn cached(&self, uncached: LAddr, size: usize) -> LAddr {
        self.inner.cached(uncached, size) - self.offset
    }
}

/// The uncached alias the configured board uses.
pub fn board_alias() -> &'static dyn Alias {
    static KSEG1: Kseg1 = Kseg1;
    static SHADOW: Option<Shadow> = Shadow::board();
    match &SHADOW {
        Some(shadow) => shadow,
        None => &KSEG1,
    }
}
