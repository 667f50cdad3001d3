use crate::{LAddr, PAddr};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Largest block handed out by a single page allocation is `1 << MAX_ORDER`
/// pages.
pub const MAX_ORDER: u32 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The physical address cannot be reached through an unmapped segment.
    OutOfSegment(PAddr),
    /// The virtual address does not belong to the expected segment.
    NotInSegment(LAddr),
    OrderTooLarge(u32),
}
