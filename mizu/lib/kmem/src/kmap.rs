use core::sync::atomic::{AtomicBool, Ordering::*};

use array_macro::array;
use config::MAX_HARTS;
use ksync_core::PreemptGuard;
use mips_paging::LAddr;

use crate::Page;

/// Transient mappings of pages without a permanent kernel address, usually
/// backed by per-CPU fixmap TLB entries.
///
/// # Safety
///
/// `map` must return an address through which the whole page is accessible
/// until the matching `unmap` on the same slot.
pub unsafe trait Kmap: Send + Sync {
    /// Index of the execution context the caller runs on, below
    /// [`MAX_HARTS`]. Called with preemption disabled.
    fn context(&self) -> usize;

    /// # Safety
    ///
    /// `slot` must be owned by the caller and currently unmapped.
    unsafe fn map(&self, slot: usize, page: Page) -> LAddr;

    /// # Safety
    ///
    /// `addr` must be the last address returned by `map` for `slot`.
    unsafe fn unmap(&self, slot: usize, addr: LAddr);
}

/// One transient mapping slot per execution context.
pub struct KmapWindow<'a> {
    kmap: &'a dyn Kmap,
    busy: [AtomicBool; MAX_HARTS],
}

impl<'a> KmapWindow<'a> {
    pub const fn new(kmap: &'a dyn Kmap) -> Self {
        KmapWindow {
            kmap,
            busy: array![_ => AtomicBool::new(false); MAX_HARTS],
        }
    }

    /// Map `page` into the slot of the current context until the returned
    /// guard is dropped. Preemption stays disabled meanwhile.
    ///
    /// # Panics
    ///
    /// Panics if the current context already holds a window.
    pub fn map_atomic(&self, page: Page) -> KmapGuard<'_> {
        let preempt = ksync_core::preempt();
        let slot = self.kmap.context();
        assert!(slot < MAX_HARTS, "kmap context {slot} out of range");

        let busy = &self.busy[slot];
        if busy.swap(true, Acquire) {
            panic!("nested kmap_atomic on context {slot}");
        }
        let addr = unsafe { self.kmap.map(slot, page) };
        KmapGuard {
            kmap: self.kmap,
            busy,
            slot,
            addr,
            _preempt: preempt,
        }
    }

    pub fn in_use(&self, slot: usize) -> bool {
        self.busy[slot].load(Relaxed)
    }
}

pub struct KmapGuard<'a> {
    kmap: &'a dyn Kmap,
    busy: &'a AtomicBool,
    slot: usize,
    addr: LAddr,
    _preempt: PreemptGuard,
}

impl KmapGuard<'_> {
    pub fn addr(&self) -> LAddr {
        self.addr
    }
}

impl Drop for KmapGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.kmap.unmap(self.slot, self.addr) };
        self.busy.store(false, Release);
    }
}
