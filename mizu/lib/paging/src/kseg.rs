//! The unmapped kernel segments of the MIPS address space.
//!
//! KSEG0 and KSEG1 both window the low 512 MiB of physical memory. Accesses
//! through KSEG0 are cached, accesses through KSEG1 bypass the caches.

use static_assertions::const_assert_eq;

use crate::{Error, LAddr, PAddr};

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        pub const CKSEG0: usize = 0xffff_ffff_8000_0000;
        pub const CKSEG1: usize = 0xffff_ffff_a000_0000;
    } else {
        pub const CKSEG0: usize = 0x8000_0000;
        pub const CKSEG1: usize = 0xa000_0000;
    }
}

pub const KSEG_SIZE: usize = 0x2000_0000;

const_assert_eq!(CKSEG1 - CKSEG0, KSEG_SIZE);

#[inline]
pub fn is_kseg0(laddr: LAddr) -> bool {
    (CKSEG0..CKSEG1).contains(&laddr.val())
}

#[inline]
pub fn is_kseg1(laddr: LAddr) -> bool {
    (CKSEG1..CKSEG1 + KSEG_SIZE).contains(&laddr.val())
}

pub fn phys_to_kseg0(paddr: PAddr) -> Result<LAddr, Error> {
    if paddr.val() < KSEG_SIZE {
        Ok(LAddr::from(CKSEG0 + paddr.val()))
    } else {
        Err(Error::OutOfSegment(paddr))
    }
}

pub fn phys_to_kseg1(paddr: PAddr) -> Result<LAddr, Error> {
    if paddr.val() < KSEG_SIZE {
        Ok(LAddr::from(CKSEG1 + paddr.val()))
    } else {
        Err(Error::OutOfSegment(paddr))
    }
}

/// Convert a cached KSEG0 address to its uncached KSEG1 alias.
pub fn uncac_addr(laddr: LAddr) -> Result<LAddr, Error> {
    if is_kseg0(laddr) {
        Ok(laddr + KSEG_SIZE)
    } else {
        Err(Error::NotInSegment(laddr))
    }
}

/// Convert an uncached KSEG1 address back to its cached KSEG0 alias.
pub fn cac_addr(laddr: LAddr) -> Result<LAddr, Error> {
    if is_kseg1(laddr) {
        Ok(laddr - KSEG_SIZE)
    } else {
        Err(Error::NotInSegment(laddr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        let paddr = PAddr::new(0x0123_4000);
        let cached = phys_to_kseg0(paddr).unwrap();
        let uncached = uncac_addr(cached).unwrap();
        assert!(is_kseg0(cached) && !is_kseg1(cached));
        assert!(is_kseg1(uncached) && !is_kseg0(uncached));
        assert_eq!(uncached, phys_to_kseg1(paddr).unwrap());
        assert_eq!(cac_addr(uncached), Ok(cached));
        assert_eq!(cac_addr(cached), Err(Error::NotInSegment(cached)));
        assert_eq!(uncac_addr(uncached), Err(Error::NotInSegment(uncached)));
    }

    #[test]
    fn test_out_of_segment() {
        let paddr = PAddr::new(KSEG_SIZE);
        assert_eq!(phys_to_kseg0(paddr), Err(Error::OutOfSegment(paddr)));
        assert_eq!(phys_to_kseg1(paddr), Err(Error::OutOfSegment(paddr)));
    }
}
