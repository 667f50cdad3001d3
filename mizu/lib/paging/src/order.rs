use crate::{Error, MAX_ORDER, PAGE_SHIFT};

/// Return the smallest order whose block covers `size` bytes.
///
/// `get_order(0)` is 0.
#[inline]
pub const fn get_order(size: usize) -> u32 {
    if size <= 1 << PAGE_SHIFT {
        return 0;
    }
    let pages = (size - 1) >> PAGE_SHIFT;
    usize::BITS - pages.leading_zeros()
}

/// Like [`get_order`], but rejects blocks the page allocator cannot serve.
pub fn checked_order(size: usize) -> Result<u32, Error> {
    match get_order(size) {
        order if order <= MAX_ORDER => Ok(order),
        order => Err(Error::OrderTooLarge(order)),
    }
}

#[inline]
pub const fn order_pages(order: u32) -> usize {
    1 << order
}

#[inline]
pub const fn order_size(order: u32) -> usize {
    1 << (order + PAGE_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PAGE_SIZE;

    #[test]
    fn test_get_order() {
        assert_eq!(get_order(0), 0);
        assert_eq!(get_order(1), 0);
        assert_eq!(get_order(PAGE_SIZE), 0);
        assert_eq!(get_order(PAGE_SIZE + 1), 1);
        assert_eq!(get_order(2 * PAGE_SIZE), 1);
        assert_eq!(get_order(3 * PAGE_SIZE), 2);
        assert_eq!(get_order(4 * PAGE_SIZE), 2);
        assert_eq!(get_order(4 * PAGE_SIZE + 1), 3);
        for order in 0..=MAX_ORDER {
            assert!(order_size(order) >= 1);
            assert_eq!(get_order(order_size(order)), order);
            assert_eq!(order_pages(order) * PAGE_SIZE, order_size(order));
        }
    }

    #[test]
    fn test_checked_order() {
        assert_eq!(checked_order(order_size(MAX_ORDER)), Ok(MAX_ORDER));
        assert_eq!(
            checked_order(order_size(MAX_ORDER) + 1),
            Err(Error::OrderTooLarge(MAX_ORDER + 1))
        );
    }
}
