use crate::semihost_trace;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Routes the `log` facade through the semihosting character writer.
pub struct SemihostLogger {
    max_level: LevelFilter,
}

impl SemihostLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Call this once during early init.
    #[allow(
        static_mut_refs,
        clippy::missing_errors_doc,
        clippy::missing_panics_doc
    )]
    pub fn init(self) -> Result<(), SetLoggerError> {
        // log::set_logger wants a &'static Log and there is no allocator
        // to leak one from, so the instance moves into a static.
        static mut LOGGER: Option<SemihostLogger> = None;

        let max_level = self.max_level;
        unsafe {
            LOGGER = Some(self);
            log::set_logger(LOGGER.as_ref().unwrap() as &'static dyn Log)?;
        }
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SemihostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // One line per record, formatted straight into the sink without
        // allocating.
        semihost_trace!(
            "{:<5} {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // characters leave through the trap one at a time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn level_filter_gates_records() {
        let logger = SemihostLogger::new(LevelFilter::Info);
        let meta = Metadata::builder().level(Level::Debug).target("boot").build();
        assert!(!logger.enabled(&meta));
        let meta = Metadata::builder().level(Level::Warn).target("boot").build();
        assert!(logger.enabled(&meta));
    }

    #[test]
    fn log_formats_without_panicking() {
        let logger = SemihostLogger::new(LevelFilter::Trace);
        logger.log(
            &Record::builder()
                .args(format_args!("vector table at {:#x}", 0x0))
                .level(Level::Info)
                .target("startup")
                .build(),
        );
    }
}
