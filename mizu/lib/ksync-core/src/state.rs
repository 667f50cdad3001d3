use core::{
    arch::asm,
    marker::PhantomData,
    sync::atomic::{AtomicUsize, Ordering::Relaxed},
};

/// Interrupt enable bit of the CP0 Status register.
const STATUS_IE: usize = 1;

unsafe fn irq_disable() {
    asm!(
        ".set push",
        ".set noat",
        "mfc0 $1, $12",
        "ori $1, $1, {ie}",
        "xori $1, $1, {ie}",
        "mtc0 $1, $12",
        "ehb",
        ".set pop",
        ie = const STATUS_IE,
    )
}

unsafe fn irq_enable() {
    asm!(
        ".set push",
        ".set noat",
        "mfc0 $1, $12",
        "ori $1, $1, {ie}",
        "mtc0 $1, $12",
        "ehb",
        ".set pop",
        ie = const STATUS_IE,
    )
}

pub struct PreemptState {
    count: AtomicUsize,
    _non_send: PhantomData<*mut ()>,
}

unsafe impl Sync for PreemptState {}

impl PreemptState {
    pub const fn new() -> Self {
        PreemptState {
            count: AtomicUsize::new(0),
            _non_send: PhantomData,
        }
    }

    pub unsafe fn disable(&self, set_status: bool) {
        if self.count.fetch_add(1, Relaxed) == 0 && set_status {
            unsafe { irq_disable() }
        }
    }

    pub unsafe fn enable(&self, set_status: bool) {
        if self.count.fetch_sub(1, Relaxed) == 1 && set_status {
            unsafe { irq_enable() }
        }
    }
}

impl Default for PreemptState {
    fn default() -> Self {
        Self::new()
    }
}

#[thread_local]
pub static PREEMPT: PreemptState = PreemptState::new();

#[no_mangle]
unsafe extern "C" fn preempt_disable(set_status: bool) {
    PREEMPT.disable(set_status)
}

#[no_mangle]
unsafe extern "C" fn preempt_enable(set_status: bool) {
    PREEMPT.enable(set_status)
}
