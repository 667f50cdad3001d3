use core::ops::Range;

use kmem::{KmapWindow, MemMap, Page, PAGE_SIZE};
use mips_paging::LAddr;

use crate::Direction;

/// Data cache maintenance by virtual address.
///
/// Nothing else in this crate touches the caches.
pub trait CacheOps: Send + Sync {
    /// Write dirty lines overlapping `range` back to memory, keeping them
    /// cached.
    ///
    /// # Safety
    ///
    /// `range` must be mapped.
    unsafe fn wback(&self, range: Range<LAddr>);

    /// Discard lines overlapping `range` so that later reads come from
    /// memory.
    ///
    /// # Safety
    ///
    /// `range` must be mapped, and nothing in it may hold CPU-written data
    /// that has not reached memory yet.
    unsafe fn inv(&self, range: Range<LAddr>);

    /// Write back, then discard.
    ///
    /// # Safety
    ///
    /// `range` must be mapped.
    unsafe fn wback_inv(&self, range: Range<LAddr>);
}

const HIT_INVALIDATE_D: u8 = 0x11;
const HIT_WRITEBACK_INV_D: u8 = 0x15;
const HIT_WRITEBACK_D: u8 = 0x19;

cfg_if::cfg_if! {
    if #[cfg(any(target_arch = "mips", target_arch = "mips64"))] {
        #[inline(always)]
        unsafe fn cache_line<const OP: u8>(addr: usize) {
            core::arch::asm!("cache {op}, 0({addr})", op = const OP, addr = in(reg) addr, options(nostack));
        }

        #[inline(always)]
        fn sync() {
            unsafe { core::arch::asm!("sync", options(nostack)) }
        }
    } else {
        #[inline(always)]
        unsafe fn cache_line<const OP: u8>(_: usize) {}

        #[inline(always)]
        fn sync() {}
    }
}

/// How an invalidation is carried out line by line.
///
/// Lines only partly covered by the range may hold unrelated dirty data, so
/// they are written back before being discarded.
#[derive(Debug, PartialEq, Eq)]
struct InvPlan {
    head: Option<usize>,
    full: Range<usize>,
    tail: Option<usize>,
}

fn plan_inv(range: Range<usize>, line: usize) -> InvPlan {
    let mask = line - 1;
    let head = range.start & !mask;
    let tail = range.end & !mask;
    let full_start = if range.start == head { head } else { head + line };

    InvPlan {
        head: (range.start != head).then_some(head),
        tail: (range.end != tail && (tail != head || range.start == head)).then_some(tail),
        full: full_start..tail.max(full_start),
    }
}

/// The primary data cache of R4000-style cores, maintained with `cache` hit
/// operations. Compiles to nothing on other architectures.
#[derive(Copy, Clone, Debug)]
pub struct R4kCache {
    line: usize,
}

impl R4kCache {
    pub const fn new() -> Self {
        Self::with_line_size(config::DCACHE_LINE_SIZE)
    }

    pub const fn with_line_size(line: usize) -> Self {
        assert!(line.is_power_of_two());
        R4kCache { line }
    }

    pub fn line_size(&self) -> usize {
        self.line
    }

    fn lines(&self, range: Range<LAddr>) -> impl Iterator<Item = usize> {
        let start = range.start.val() & !(self.line - 1);
        (start..range.end.val()).step_by(self.line)
    }
}

impl Default for R4kCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheOps for R4kCache {
    unsafe fn wback(&self, range: Range<LAddr>) {
        self.lines(range).for_each(|l| cache_line::<HIT_WRITEBACK_D>(l));
        sync()
    }

    unsafe fn inv(&self, range: Range<LAddr>) {
        if range.start >= range.end {
            return;
        }
        let plan = plan_inv(range.start.val()..range.end.val(), self.line);
        plan.head.into_iter().for_each(|l| cache_line::<HIT_WRITEBACK_INV_D>(l));
        (plan.full.step_by(self.line)).for_each(|l| cache_line::<HIT_INVALIDATE_D>(l));
        plan.tail.into_iter().for_each(|l| cache_line::<HIT_WRITEBACK_INV_D>(l));
        sync()
    }

    unsafe fn wback_inv(&self, range: Range<LAddr>) {
        self.lines(range).for_each(|l| cache_line::<HIT_WRITEBACK_INV_D>(l));
        sync()
    }
}

/// Applies the cache operation a transfer direction calls for.
pub struct Synchronizer<'a> {
    cache: &'a dyn CacheOps,
    memmap: &'a MemMap,
    kmap: &'a KmapWindow<'a>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(cache: &'a dyn CacheOps, memmap: &'a MemMap, kmap: &'a KmapWindow<'a>) -> Self {
        Synchronizer {
            cache,
            memmap,
            kmap,
        }
    }

    pub fn memmap(&self) -> &'a MemMap {
        self.memmap
    }

    /// Synchronize a range with a permanent kernel mapping.
    ///
    /// # Panics
    ///
    /// Panics if `dir` is [`Direction::None`].
    #[track_caller]
    pub fn sync_virtual(&self, addr: LAddr, size: usize, dir: Direction) {
        let range = addr.to_range(size);
        unsafe {
            match dir {
                Direction::ToDevice => self.cache.wback(range),
                Direction::FromDevice => self.cache.inv(range),
                Direction::Bidirectional => self.cache.wback_inv(range),
                Direction::None => panic!("invalid DMA direction"),
            }
        }
    }

    /// Synchronize `size` bytes starting `offset` bytes into `page`, one page
    /// at a time. High memory pages are reached through the transient window
    /// of the current context.
    ///
    /// # Panics
    ///
    /// Panics if `dir` is [`Direction::None`], or if the window of the
    /// current context is already taken.
    #[track_caller]
    pub fn sync_page(&self, page: Page, offset: usize, size: usize, dir: Direction) {
        dir.check();
        let mut page = page + offset / PAGE_SIZE;
        let mut offset = offset % PAGE_SIZE;
        let mut left = size;

        while left > 0 {
            let len = left.min(PAGE_SIZE - offset);
            match self.memmap.page_address(page) {
                Some(base) => self.sync_virtual(base + offset, len, dir),
                None => {
                    let window = self.kmap.map_atomic(page);
                    self.sync_virtual(window.addr() + offset, len, dir);
                }
            }
            page = page + 1;
            offset = 0;
            left -= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Fixture, Op, HIGHMEM_BASE, LOWMEM_BASE};
    use kmem::PAddr;

    #[test]
    fn test_plan_inv() {
        assert_eq!(
            plan_inv(0x100..0x200, 32),
            InvPlan {
                head: None,
                full: 0x100..0x200,
                tail: None
            }
        );
        assert_eq!(
            plan_inv(0x104..0x1f0, 32),
            InvPlan {
                head: Some(0x100),
                full: 0x120..0x1e0,
                tail: Some(0x1e0)
            }
        );
        // Inside a single line.
        assert_eq!(
            plan_inv(0x104..0x10c, 32),
            InvPlan {
                head: Some(0x100),
                full: 0x120..0x120,
                tail: None
            }
        );
        assert_eq!(
            plan_inv(0x100..0x10c, 32),
            InvPlan {
                head: None,
                full: 0x100..0x100,
                tail: Some(0x100)
            }
        );
    }

    #[test]
    fn test_directions() {
        let fixture = Fixture::new();
        let sync = fixture.synchronizer();
        let addr = fixture.linear(PAddr::new(LOWMEM_BASE));

        sync.sync_virtual(addr, 0x80, Direction::ToDevice);
        sync.sync_virtual(addr, 0x80, Direction::FromDevice);
        sync.sync_virtual(addr, 0x80, Direction::Bidirectional);
        let range = addr.to_range(0x80);
        assert_eq!(
            fixture.cache.take_log(),
            [
                (Op::Wback, range.clone()),
                (Op::Inv, range.clone()),
                (Op::WbackInv, range)
            ]
        );
    }

    #[test]
    #[should_panic(expected = "invalid DMA direction")]
    fn test_no_direction() {
        let fixture = Fixture::new();
        let page = Page::containing(PAddr::new(LOWMEM_BASE));
        fixture.synchronizer().sync_page(page, 0, 1, Direction::None);
    }

    #[test]
    fn test_three_pages() {
        let fixture = Fixture::new();
        let sync = fixture.synchronizer();

        for base in [LOWMEM_BASE, HIGHMEM_BASE] {
            let page = Page::containing(PAddr::new(base));
            sync.sync_page(page, 0, 3 * PAGE_SIZE, Direction::FromDevice);
            let log = fixture.cache.take_log();
            assert_eq!(log.len(), 3);
            for (op, range) in log {
                assert_eq!(op, Op::Inv);
                assert_eq!(range.start.in_page_offset(), 0);
                assert_eq!(range.end.val() - range.start.val(), PAGE_SIZE);
            }
        }
        assert_eq!(fixture.kmap.maps(), 3);
        assert!(!fixture.window.in_use(0));
    }

    #[test]
    fn test_unaligned_span() {
        let fixture = Fixture::new();
        let sync = fixture.synchronizer();
        let page = Page::containing(PAddr::new(HIGHMEM_BASE));

        // Offsets past the first page move to the right page.
        sync.sync_page(page, PAGE_SIZE + 0x800, PAGE_SIZE, Direction::ToDevice);
        let log = fixture.cache.take_log();
        assert_eq!(log.len(), 2);
        let first = fixture.kmap.host_of(PAddr::new(HIGHMEM_BASE + PAGE_SIZE + 0x800));
        let second = fixture.kmap.host_of(PAddr::new(HIGHMEM_BASE + 2 * PAGE_SIZE));
        assert_eq!(log[0], (Op::Wback, first.to_range(0x800)));
        assert_eq!(log[1], (Op::Wback, second.to_range(0x800)));

        sync.sync_page(page, 0, 0, Direction::ToDevice);
        assert!(fixture.cache.take_log().is_empty());
    }
}
