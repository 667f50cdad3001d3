use core::{
    mem,
    ops::{Add, AddAssign, Deref, DerefMut, Range, Sub, SubAssign},
    ptr::NonNull,
    slice,
};

use crate::{PAGE_MASK, PAGE_SHIFT};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(transparent)]
pub struct PAddr(usize);

impl PAddr {
    #[inline]
    pub const fn new(addr: usize) -> Self {
        PAddr(addr)
    }

    #[inline]
    pub const fn val(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn pfn(self) -> Pfn {
        Pfn(self.0 >> PAGE_SHIFT)
    }

    pub const fn in_page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    pub const fn page_base(self) -> Self {
        PAddr(self.0 & !PAGE_MASK)
    }

    pub fn checked_add(self, rhs: usize) -> Option<Self> {
        self.0.checked_add(rhs).map(PAddr)
    }
}

impl Add<usize> for PAddr {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        PAddr::new(*self + rhs)
    }
}

impl AddAssign<usize> for PAddr {
    fn add_assign(&mut self, rhs: usize) {
        **self += rhs
    }
}

impl Sub<usize> for PAddr {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        PAddr::new(*self - rhs)
    }
}

impl SubAssign<usize> for PAddr {
    fn sub_assign(&mut self, rhs: usize) {
        **self -= rhs
    }
}

impl Deref for PAddr {
    type Target = usize;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PAddr {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl core::fmt::Debug for PAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PAddr({:#x})", self.0)
    }
}

/// A kernel (CPU-visible) virtual address.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LAddr(usize);

impl LAddr {
    #[inline]
    pub fn new(ptr: *mut u8) -> Self {
        LAddr(ptr as _)
    }

    #[inline]
    pub const fn val(&self) -> usize {
        self.0
    }

    pub const fn in_page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    pub fn to_range(self, size: usize) -> Range<Self> {
        self..LAddr(self.0.wrapping_add(size))
    }

    /// # Safety
    ///
    /// See ['slice::from_raw_parts'] for more info.
    pub unsafe fn as_slice<'a>(this: Range<Self>) -> &'a [u8] {
        unsafe { slice::from_raw_parts(*this.start, this.end.val() - this.start.val()) }
    }

    /// # Safety
    ///
    /// See ['slice::from_raw_parts_mut'] for more info.
    pub unsafe fn as_mut_slice<'a>(this: Range<Self>) -> &'a mut [u8] {
        unsafe { slice::from_raw_parts_mut(*this.start, this.end.val() - this.start.val()) }
    }
}

impl Deref for LAddr {
    type Target = *mut u8;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { mem::transmute(&self.0) }
    }
}

impl DerefMut for LAddr {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { mem::transmute(&mut self.0) }
    }
}

impl From<usize> for LAddr {
    #[inline]
    fn from(val: usize) -> Self {
        LAddr(val)
    }
}

impl<T> From<*const T> for LAddr {
    #[inline]
    fn from(val: *const T) -> Self {
        LAddr(val as _)
    }
}

impl<T> From<*mut T> for LAddr {
    #[inline]
    fn from(val: *mut T) -> Self {
        LAddr(val as _)
    }
}

impl<T: ?Sized> From<NonNull<T>> for LAddr {
    #[inline]
    fn from(ptr: NonNull<T>) -> Self {
        LAddr::new(ptr.as_ptr().cast())
    }
}

impl Add<usize> for LAddr {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        LAddr::from(self.val() + rhs)
    }
}

impl AddAssign<usize> for LAddr {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl Sub<usize> for LAddr {
    type Output = Self;

    fn sub(self, rhs: usize) -> Self::Output {
        LAddr::from(self.val() - rhs)
    }
}

impl SubAssign<usize> for LAddr {
    fn sub_assign(&mut self, rhs: usize) {
        *self = *self - rhs;
    }
}

impl core::fmt::Debug for LAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "LAddr({:#x})", self.0)
    }
}

/// The address a device puts on the bus to reach memory.
///
/// Bus addresses are always 64 bits wide, even on 32-bit CPUs, since devices
/// behind a 64-bit window may still be driven by them.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BusAddr(u64);

impl BusAddr {
    /// Returned by a mapping operation that failed to produce a usable
    /// address.
    pub const ERROR: BusAddr = BusAddr(u64::MAX);

    #[inline]
    pub const fn new(addr: u64) -> Self {
        BusAddr(addr)
    }

    #[inline]
    pub const fn val(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 == u64::MAX
    }

    pub const fn in_page_offset(self) -> usize {
        self.0 as usize & PAGE_MASK
    }

    pub fn checked_add(self, rhs: usize) -> Option<Self> {
        self.0.checked_add(rhs as u64).map(BusAddr)
    }
}

impl Add<usize> for BusAddr {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        BusAddr(self.0 + rhs as u64)
    }
}

impl core::fmt::Debug for BusAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_error() {
            write!(f, "BusAddr(<ERROR>)")
        } else {
            write!(f, "BusAddr({:#x})", self.0)
        }
    }
}

/// Physical page frame number.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[repr(transparent)]
pub struct Pfn(usize);

impl Pfn {
    #[inline]
    pub const fn new(pfn: usize) -> Self {
        Pfn(pfn)
    }

    #[inline]
    pub const fn val(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn base(self) -> PAddr {
        PAddr(self.0 << PAGE_SHIFT)
    }
}

impl Add<usize> for Pfn {
    type Output = Self;

    fn add(self, rhs: usize) -> Self::Output {
        Pfn(self.0 + rhs)
    }
}

impl AddAssign<usize> for Pfn {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs
    }
}

impl core::fmt::Debug for Pfn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pfn({:#x})", self.0)
    }
}
