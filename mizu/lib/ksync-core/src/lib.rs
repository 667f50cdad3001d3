#![no_std]
#![cfg_attr(
    any(target_arch = "mips", target_arch = "mips64"),
    feature(asm_experimental_arch, thread_local)
)]

use core::marker::PhantomData;

#[cfg(any(target_arch = "mips", target_arch = "mips64"))]
mod state;

/// Enter a critical section in a single core. Do not use it with multi-core
/// synchoronization. Intended to be used with mutexes.
///
/// Doesn't have any effect on non-MIPS targets, test cases included.
///
/// # Examples
///
/// ```rust,ignore
/// use spin::Mutex;
///
/// let mutex = Mutex::new(0);
/// ksync_core::critical(|| {
///     let value = mutex.lock();
///     assert_eq!(*value, 0);
/// })
/// ```
#[inline]
pub fn critical<R>(f: impl FnOnce() -> R) -> R {
    let _preempt = preempt();
    f()
}

/// Keeps interrupts and preemption off on the current CPU until dropped.
///
/// Guards nest; the outermost one restores interrupts.
#[must_use]
pub struct PreemptGuard {
    _non_send: PhantomData<*mut ()>,
}

#[inline]
pub fn preempt() -> PreemptGuard {
    unsafe { disable() };
    PreemptGuard {
        _non_send: PhantomData,
    }
}

impl Drop for PreemptGuard {
    #[inline]
    fn drop(&mut self) {
        unsafe { enable() }
    }
}

/// Disable interrupts manually.
///
/// # Safety
///
/// The caller must care about the potential risks of functions that have sth to
/// do with interrupts.
pub unsafe fn disable() {
    #[cfg(any(target_arch = "mips", target_arch = "mips64"))]
    state::PREEMPT.disable(true)
}

/// Enable interrupts manually.
///
/// # Safety
///
/// The caller must care about the potential risks of functions that have sth to
/// do with interrupts.
pub unsafe fn enable() {
    #[cfg(any(target_arch = "mips", target_arch = "mips64"))]
    state::PREEMPT.enable(true)
}
