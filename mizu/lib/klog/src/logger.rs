use core::fmt;

use log::Level;
use spin::Once;

use crate::println;

struct OptionU32Display(Option<u32>);

impl core::fmt::Display for OptionU32Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(val) = self.0 {
            write!(f, "{val}")
        } else {
            write!(f, "<NULL>")
        }
    }
}

struct Logger(Level);

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.0
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() < Level::Debug {
            println!("[{}] {}", record.level(), record.args())
        } else {
            let file = record.file().unwrap_or("<NULL>");
            let line = OptionU32Display(record.line());
            println!("[{}] [{file}:{line}] {}", record.level(), record.args())
        }
    }

    fn flush(&self) {}
}

static LOGGER: Once<Logger> = Once::new();

/// Install the kernel logger.
///
/// Only the first call takes effect; later calls keep the level chosen then.
pub fn init(max_level: Level) {
    let mut installed = false;
    let logger = LOGGER.call_once(|| {
        installed = true;
        Logger(max_level)
    });
    if installed && log::set_logger(logger).is_ok() {
        log::set_max_level(max_level.to_level_filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(Level::Debug);
        init(Level::Error);
        assert_eq!(log::max_level(), Level::Debug.to_level_filter());
        log::debug!("logger installed");
    }
}
