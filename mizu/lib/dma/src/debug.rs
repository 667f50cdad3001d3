use alloc::{collections::BTreeMap, vec::Vec};

use mips_paging::BusAddr;
use spin::Mutex;

use crate::{Device, Direction};

/// Default number of entries tracked before the registry gives up.
pub const PREALLOC_ENTRIES: usize = 1 << 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Kind {
    Streaming(Direction),
    Coherent,
}

impl Kind {
    fn same_class(self, other: Kind) -> bool {
        matches!(
            (self, other),
            (Kind::Streaming(_), Kind::Streaming(_)) | (Kind::Coherent, Kind::Coherent)
        )
    }
}

#[derive(Copy, Clone, Debug)]
struct Entry {
    dev: &'static str,
    size: usize,
    kind: Kind,
}

struct Inner {
    map: BTreeMap<u64, Vec<Entry>>,
    count: usize,
    disabled: bool,
}

/// Records live mappings and catches drivers that misuse them.
///
/// Every check failure is a bug in the caller and panics. Once more than
/// `capacity` mappings are live the registry stops tracking altogether,
/// since it can no longer tell unknown handles from untracked ones.
pub struct DebugRegistry {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl DebugRegistry {
    pub const fn new() -> Self {
        Self::with_capacity(PREALLOC_ENTRIES)
    }

    pub const fn with_capacity(capacity: usize) -> Self {
        DebugRegistry {
            inner: Mutex::new(Inner {
                map: BTreeMap::new(),
                count: 0,
                disabled: false,
            }),
            capacity,
        }
    }

    /// Number of live mappings, coherent buffers included.
    pub fn live(&self) -> usize {
        ksync_core::critical(|| self.inner.lock().count)
    }

    pub fn is_disabled(&self) -> bool {
        ksync_core::critical(|| self.inner.lock().disabled)
    }

    fn add(&self, dev: &Device, bus: BusAddr, size: usize, kind: Kind) {
        ksync_core::critical(|| {
            let mut inner = self.inner.lock();
            if inner.disabled {
                return;
            }
            if inner.count >= self.capacity {
                log::warn!("DMA debug: out of entries, disabling checks");
                inner.disabled = true;
                inner.map.clear();
                inner.count = 0;
                return;
            }
            let entry = Entry {
                dev: dev.name(),
                size,
                kind,
            };
            inner.map.entry(bus.val()).or_default().push(entry);
            inner.count += 1;
        })
    }

    #[track_caller]
    fn remove(&self, dev: &Device, bus: BusAddr, size: usize, kind: Kind) {
        ksync_core::critical(|| {
            let mut inner = self.inner.lock();
            if inner.disabled {
                return;
            }
            let entries = inner.map.get_mut(&bus.val());
            let found = entries.and_then(|entries| {
                let exact = |e: &Entry| e.dev == dev.name() && e.size == size && e.kind == kind;
                let similar = |e: &Entry| e.dev == dev.name() && e.kind.same_class(kind);
                let index = (entries.iter().position(exact))
                    .or_else(|| entries.iter().position(similar))?;
                let entry = entries.swap_remove(index);
                Some((entry, entries.is_empty()))
            });
            let Some((entry, empty)) = found else {
                match kind {
                    Kind::Coherent => panic!(
                        "DMA debug: {}: freeing unknown coherent buffer at {bus:?}",
                        dev.name()
                    ),
                    Kind::Streaming(_) => panic!(
                        "DMA debug: {}: unmapping unknown DMA address {bus:?}",
                        dev.name()
                    ),
                }
            };
            if empty {
                inner.map.remove(&bus.val());
            }
            inner.count -= 1;

            assert_eq!(
                entry.size,
                size,
                "DMA debug: {}: size mismatch on {bus:?}",
                dev.name()
            );
            assert_eq!(
                entry.kind,
                kind,
                "DMA debug: {}: direction mismatch on {bus:?}",
                dev.name()
            );
        })
    }

    pub fn map(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        self.add(dev, bus, size, Kind::Streaming(dir))
    }

    /// # Panics
    ///
    /// Panics if no mapping of `dev` starts at `bus`, or if it was made with a
    /// different size or direction.
    #[track_caller]
    pub fn unmap(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        self.remove(dev, bus, size, Kind::Streaming(dir))
    }

    pub fn alloc_coherent(&self, dev: &Device, bus: BusAddr, size: usize) {
        self.add(dev, bus, size, Kind::Coherent)
    }

    /// # Panics
    ///
    /// Panics if `dev` holds no coherent buffer of `size` bytes at `bus`.
    #[track_caller]
    pub fn free_coherent(&self, dev: &Device, bus: BusAddr, size: usize) {
        self.remove(dev, bus, size, Kind::Coherent)
    }

    /// # Panics
    ///
    /// Panics if `[bus, bus + size)` is not inside a live streaming mapping of
    /// `dev`, or if the mapping only allows the other direction.
    #[track_caller]
    pub fn sync(&self, dev: &Device, bus: BusAddr, size: usize, dir: Direction) {
        ksync_core::critical(|| {
            let inner = self.inner.lock();
            if inner.disabled {
                return;
            }
            let end = bus.val().saturating_add(size as u64);
            let mut covering = (inner.map.range(..=bus.val()).rev())
                .flat_map(|(&start, entries)| entries.iter().map(move |e| (start, e)))
                .filter(|(start, e)| {
                    e.dev == dev.name()
                        && matches!(e.kind, Kind::Streaming(_))
                        && end <= start + e.size as u64
                })
                .map(|(_, e)| e.kind)
                .peekable();
            if covering.peek().is_none() {
                panic!(
                    "DMA debug: {}: sync of {bus:?}+{size:#x} outside any live mapping",
                    dev.name()
                )
            }
            let allowed = |kind| match kind {
                Kind::Streaming(mapped) => mapped == Direction::Bidirectional || mapped == dir,
                Kind::Coherent => false,
            };
            assert!(
                covering.any(allowed),
                "DMA debug: {}: syncing {bus:?} {dir:?} against the mapped direction",
                dev.name()
            );
        })
    }
}

impl Default for DebugRegistry {
    fn default() -> Self {
        Self::new()
    }
}
