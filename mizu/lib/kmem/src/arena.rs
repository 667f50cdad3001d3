use core::{
    num::NonZeroUsize,
    ops::Range,
    ptr,
    sync::atomic::{AtomicUsize, Ordering::*},
};

use mips_paging::{LAddr, PAGE_SHIFT, PAGE_SIZE};
use spin::Mutex;

/// Header of a free block, stored in its first page.
#[derive(Clone, Copy)]
struct Node {
    next: *mut Node,
    count: usize,
}

/// Free blocks sorted by address, plus the untouched tail of the region.
struct FreeList {
    head: *mut Node,
    top: usize,
}

unsafe impl Send for FreeList {}

impl FreeList {
    /// Carve `count` pages from the front of the first block large enough.
    unsafe fn take(&mut self, count: usize) -> Option<LAddr> {
        let mut link: *mut *mut Node = &mut self.head;
        loop {
            let node = *link;
            if node.is_null() {
                break None;
            }
            let Node { next, count: avail } = node.read();
            if avail >= count {
                *link = if avail == count {
                    next
                } else {
                    let rest = node.cast::<u8>().add(count * PAGE_SIZE).cast::<Node>();
                    rest.write(Node {
                        next,
                        count: avail - count,
                    });
                    rest
                };
                break Some(LAddr::from(node));
            }
            link = ptr::addr_of_mut!((*node).next);
        }
    }

    fn bump(&mut self, count: usize, end: LAddr) -> Option<LAddr> {
        let next = self.top.checked_add(count.checked_mul(PAGE_SIZE)?)?;
        (next <= end.val()).then(|| LAddr::from(core::mem::replace(&mut self.top, next)))
    }

    /// Put a block back, merging it with its free neighbours. A block that
    /// ends at `top` is returned to the untouched tail instead.
    unsafe fn insert(&mut self, addr: LAddr, count: usize) {
        let mut start = addr.val();
        let mut end = start + count * PAGE_SIZE;

        let mut prev_link: *mut *mut Node = ptr::null_mut();
        let mut link: *mut *mut Node = &mut self.head;
        while !(*link).is_null() && ((*link) as usize) < start {
            prev_link = link;
            link = ptr::addr_of_mut!((**link).next);
        }
        debug_assert!((*link).is_null() || end <= *link as usize, "double free");

        let mut next = *link;
        if !next.is_null() && next as usize == end {
            end += (*next).count * PAGE_SIZE;
            next = (*next).next;
        }
        if !prev_link.is_null() {
            let prev = *prev_link;
            let prev_end = prev as usize + (*prev).count * PAGE_SIZE;
            debug_assert!(prev_end <= start, "double free");
            if prev_end == start {
                start = prev as usize;
                link = prev_link;
            }
        }

        if next.is_null() && end == self.top {
            self.top = start;
            *link = ptr::null_mut();
        } else {
            let node = start as *mut Node;
            node.write(Node {
                next,
                count: (end - start) >> PAGE_SHIFT,
            });
            *link = node;
        }
    }
}

/// A page arena over one linearly mapped physical region.
///
/// Free blocks are threaded through their own first page in address order
/// and coalesce on free; untouched memory at the top of the region is handed
/// out by bumping `top`. Allocation is first fit.
pub struct Arena {
    list: Mutex<FreeList>,
    base: LAddr,
    end: LAddr,

    count: AtomicUsize,
}

impl Arena {
    /// Creates a new [`Arena`].
    ///
    /// # Safety
    ///
    /// `range` must be page-aligned and contain a bunch of valid free pages
    /// that stay mapped for the lifetime of the arena.
    pub unsafe fn new(range: Range<LAddr>) -> Self {
        debug_assert_eq!(range.start.in_page_offset(), 0);
        debug_assert_eq!(range.end.in_page_offset(), 0);
        Arena {
            list: Mutex::new(FreeList {
                head: ptr::null_mut(),
                top: range.start.val(),
            }),
            base: range.start,
            end: range.end,
            count: AtomicUsize::new(0),
        }
    }

    pub fn contains(&self, addr: LAddr) -> bool {
        (self.base..self.end).contains(&addr)
    }

    pub fn allocate(&self, count: NonZeroUsize) -> Option<LAddr> {
        let addr = ksync_core::critical(|| {
            let mut list = self.list.lock();
            unsafe { list.take(count.get()) }.or_else(|| list.bump(count.get(), self.end))
        })?;
        log::trace!("page allocation at {addr:?}, count = {count}");
        self.count.fetch_add(count.get(), SeqCst);
        Some(addr)
    }

    /// # Safety
    ///
    /// `addr` must contains `count` valid pages which is no longer used and was
    /// previous allocated by this arena.
    pub unsafe fn deallocate(&self, addr: LAddr, count: NonZeroUsize) {
        debug_assert!(self.contains(addr));
        log::trace!("page deallocation at {addr:?}, count = {count}");
        ksync_core::critical(|| self.list.lock().insert(addr, count.get()));
        self.count.fetch_sub(count.get(), SeqCst);
    }

    pub fn used_count(&self) -> usize {
        self.count.load(Relaxed)
    }

    pub fn total_count(&self) -> usize {
        (self.end.val() - self.base.val()) >> PAGE_SHIFT
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("range", &(self.base..self.end))
            .field("used", &self.used_count())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use super::*;

    #[repr(align(4096))]
    pub struct Memory<const N: usize>(pub [[u8; PAGE_SIZE]; N]);

    pub fn leak_memory<const N: usize>() -> Range<LAddr> {
        let memory = Box::leak(Box::new(Memory::<N>([[0; PAGE_SIZE]; N])));
        let range = memory.0.as_mut_ptr_range();
        LAddr::from(range.start)..LAddr::from(range.end)
    }

    #[test]
    fn test_fresh_and_reuse() {
        let range = leak_memory::<8>();
        let arena = unsafe { Arena::new(range.clone()) };
        assert_eq!(arena.total_count(), 8);

        let a = arena.allocate(NonZeroUsize::new(4).unwrap()).unwrap();
        let b = arena.allocate(NonZeroUsize::new(4).unwrap()).unwrap();
        assert_eq!(a, range.start);
        assert_eq!(b, range.start + 4 * PAGE_SIZE);
        assert!(arena.allocate(NonZeroUsize::MIN).is_none());
        assert_eq!(arena.used_count(), 8);

        unsafe { arena.deallocate(a, NonZeroUsize::new(4).unwrap()) };
        assert_eq!(arena.used_count(), 4);

        // A freed block is split on demand.
        let c = arena.allocate(NonZeroUsize::MIN).unwrap();
        let d = arena.allocate(NonZeroUsize::new(3).unwrap()).unwrap();
        assert_eq!(c, a);
        assert_eq!(d, a + PAGE_SIZE);
        assert!(arena.allocate(NonZeroUsize::MIN).is_none());
    }

    #[test]
    fn test_first_fit() {
        let range = leak_memory::<16>();
        let arena = unsafe { Arena::new(range.clone()) };
        let pages = |n| NonZeroUsize::new(n).unwrap();

        let x = arena.allocate(pages(1)).unwrap();
        let big = arena.allocate(pages(4)).unwrap();
        let y = arena.allocate(pages(1)).unwrap();
        let small = arena.allocate(pages(1)).unwrap();
        let rest = arena.allocate(pages(9)).unwrap();
        assert!(arena.allocate(pages(1)).is_none());

        // The small block ends up ahead in time but not in address order.
        unsafe {
            arena.deallocate(big, pages(4));
            arena.deallocate(small, pages(1));
        }
        assert_eq!(arena.allocate(pages(3)), Some(big));
        assert_eq!(arena.allocate(pages(2)), None);
        assert_eq!(arena.allocate(pages(1)), Some(big + 3 * PAGE_SIZE));
        assert_eq!(arena.allocate(pages(1)), Some(small));

        unsafe {
            arena.deallocate(big, pages(3));
            arena.deallocate(big + 3 * PAGE_SIZE, pages(1));
            arena.deallocate(small, pages(1));
            arena.deallocate(rest, pages(9));
            arena.deallocate(x, pages(1));
            arena.deallocate(y, pages(1));
        }
        assert_eq!(arena.used_count(), 0);
        // Everything coalesced back into one run.
        assert_eq!(arena.allocate(pages(16)), Some(range.start));
    }

    #[test]
    fn test_coalesce() {
        let range = leak_memory::<16>();
        let arena = unsafe { Arena::new(range) };
        let pages = |n| NonZeroUsize::new(n).unwrap();

        let a = arena.allocate(pages(4)).unwrap();
        let b = arena.allocate(pages(1)).unwrap();
        let singles = (0..11)
            .map(|_| arena.allocate(pages(1)).unwrap())
            .collect::<Vec<_>>();
        assert!(arena.allocate(pages(1)).is_none());

        unsafe {
            arena.deallocate(a, pages(4));
            arena.deallocate(b, pages(1));
        }
        assert_eq!(arena.allocate(pages(5)), Some(a));

        for addr in singles {
            unsafe { arena.deallocate(addr, pages(1)) }
        }
        assert_eq!(arena.allocate(pages(11)), Some(b + PAGE_SIZE));
    }

    #[test]
    fn test_concurrent() {
        const PAGES: usize = 64;
        let range = leak_memory::<PAGES>();
        let arena = unsafe { Arena::new(range) };

        let mut pool = scoped_threadpool::Pool::new(4);
        let mut results = vec![Vec::new(); 4];
        pool.scoped(|scope| {
            for result in results.iter_mut() {
                let arena = &arena;
                scope.execute(move || {
                    for _ in 0..PAGES / 4 {
                        let addr = arena.allocate(NonZeroUsize::MIN).unwrap();
                        result.push(addr.val());
                    }
                })
            }
        });

        let all = results.iter().flatten().copied().collect::<HashSet<_>>();
        assert_eq!(all.len(), PAGES);
        assert_eq!(arena.used_count(), PAGES);
        assert!(arena.allocate(NonZeroUsize::MIN).is_none());

        for addr in all {
            unsafe { arena.deallocate(LAddr::from(addr), NonZeroUsize::MIN) }
        }
        assert_eq!(arena.used_count(), 0);
    }
}
