use core::ops::Add;

use mips_paging::{PAddr, Pfn};

/// A reference to one physical page frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Page(Pfn);

impl Page {
    #[inline]
    pub const fn from_pfn(pfn: Pfn) -> Self {
        Page(pfn)
    }

    /// The page that contains `paddr`.
    #[inline]
    pub const fn containing(paddr: PAddr) -> Self {
        Page(paddr.pfn())
    }

    #[inline]
    pub const fn pfn(self) -> Pfn {
        self.0
    }

    #[inline]
    pub const fn base(self) -> PAddr {
        self.0.base()
    }
}

impl Add<usize> for Page {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Page(self.0 + rhs)
    }
}
