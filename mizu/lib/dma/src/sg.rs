use kmem::Page;
use mips_paging::{BusAddr, PAddr};

/// One piece of a scattered transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScatterEntry {
    pub page: Page,
    pub offset: usize,
    pub length: usize,
    /// Filled in by `map_sg`.
    pub dma_address: BusAddr,
    pub dma_length: usize,
}

impl ScatterEntry {
    pub const fn new(page: Page, offset: usize, length: usize) -> Self {
        ScatterEntry {
            page,
            offset,
            length,
            dma_address: BusAddr::ERROR,
            dma_length: 0,
        }
    }

    pub const fn from_phys(paddr: PAddr, length: usize) -> Self {
        Self::new(Page::containing(paddr), paddr.in_page_offset(), length)
    }

    pub fn is_mapped(&self) -> bool {
        !self.dma_address.is_error()
    }
}
