use core::fmt;

use crate::BusAddr;

/// The set of bus addresses a device can generate, as an all-ones low mask.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DmaMask(u64);

impl DmaMask {
    pub const FULL: DmaMask = DmaMask(u64::MAX);

    /// The mask of a device that drives `bits` address lines.
    pub const fn bits(bits: u32) -> Self {
        if bits >= 64 {
            DmaMask(u64::MAX)
        } else {
            DmaMask((1 << bits) - 1)
        }
    }

    #[inline]
    pub const fn val(self) -> u64 {
        self.0
    }

    /// Number of significant address lines.
    pub const fn width(self) -> u32 {
        u64::BITS - self.0.leading_zeros()
    }

    /// Whether the whole `[bus, bus + size)` range is reachable.
    pub fn covers(self, bus: BusAddr, size: usize) -> bool {
        if bus.is_error() {
            return false;
        }
        let last = match size.checked_sub(1) {
            Some(len) => bus.val().checked_add(len as u64),
            None => Some(bus.val()),
        };
        last.map_or(false, |last| last <= self.0)
    }
}

impl fmt::Debug for DmaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DmaMask({} bits)", self.width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits() {
        assert_eq!(DmaMask::bits(32).val(), 0xffff_ffff);
        assert_eq!(DmaMask::bits(24).val(), 0xff_ffff);
        assert_eq!(DmaMask::bits(64), DmaMask::FULL);
        assert_eq!(DmaMask::bits(70), DmaMask::FULL);
        assert_eq!(DmaMask::bits(32).width(), 32);
        assert!(DmaMask::bits(24) < DmaMask::bits(32));
    }

    #[test]
    fn test_covers() {
        let mask = DmaMask::bits(32);
        assert!(mask.covers(BusAddr::new(0xffff_f000), 0x1000));
        assert!(!mask.covers(BusAddr::new(0xffff_f000), 0x1001));
        assert!(!mask.covers(BusAddr::new(0x1_0000_0000), 1));
        assert!(mask.covers(BusAddr::new(0), 0));
        assert!(!mask.covers(BusAddr::ERROR, 1));
        assert!(!DmaMask::FULL.covers(BusAddr::new(u64::MAX - 1), 4));
    }
}
