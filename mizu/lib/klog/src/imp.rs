use core::{
    fmt,
    sync::atomic::{AtomicPtr, Ordering::*},
};
#[cfg(any(test, feature = "test"))]
use std::io::Write;

use spin::Mutex;

static CONSOLE: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Register the byte sink of the boot console, e.g. the UART transmit routine.
///
/// Bytes printed before any console is registered are dropped.
pub fn set_console(putchar: fn(u8)) {
    CONSOLE.store(putchar as *mut (), Release)
}

pub struct Output(());

impl Output {
    pub fn write_byte(&mut self, byte: u8) {
        #[cfg(not(any(test, feature = "test")))]
        {
            let ptr = CONSOLE.load(Acquire);
            if !ptr.is_null() {
                // SAFETY: Only `set_console` stores into `CONSOLE`.
                let putchar = unsafe { core::mem::transmute::<*mut (), fn(u8)>(ptr) };
                putchar(byte)
            }
        }
        #[cfg(any(test, feature = "test"))]
        {
            let _ = &CONSOLE;
            let _ = std::io::stdout().lock().write(&[byte]);
        }
    }
}

impl fmt::Write for Output {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(|byte| self.write_byte(byte));
        Ok(())
    }
}

pub static OUTPUT: Mutex<Output> = Mutex::new(Output(()));

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::critical(|| {
            use core::fmt::Write;
            let _ = write!(*$crate::imp::OUTPUT.lock(), $($arg)*);
        })
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::critical(|| $crate::imp::OUTPUT.lock().write_byte(b'\n'))
    };
    ($($arg:tt)*) => {
        $crate::critical(|| {
            use core::fmt::Write;
            let _ = writeln!(*$crate::imp::OUTPUT.lock(), $($arg)*);
        })
    };
}
