//! Kernel-style stderr logger behind the `log` facade
//!
//! Every line is written under the stderr lock, so output from the scan
//! and from the report writers never interleaves mid-line.
//!
//! # Environment Variables
//!
//! - `KMEM_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0-5). Default: warn
//! - `KMEM_FLUSH_EPRINT=1` - Flush stderr after each line (useful when the process may be killed)
//!
//! # Usage
//!
//! ```ignore
//! kmem_core::kprint::init();
//! log::debug!("vm_page_array at {:#x}", base);
//! ```

use std::io::Write;
use std::sync::OnceLock;

use log::{LevelFilter, Log, Metadata, Record};

/// Level used when `KMEM_LOG_LEVEL` is unset or unparsable
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// The stderr logger
#[derive(Debug)]
pub struct Kprint {
    level: LevelFilter,
    flush: bool,
}

static LOGGER: OnceLock<Kprint> = OnceLock::new();

impl Kprint {
    pub fn new(level: LevelFilter, flush: bool) -> Self {
        Self { level, flush }
    }

    /// Build from `KMEM_LOG_LEVEL` and `KMEM_FLUSH_EPRINT`
    pub fn from_env() -> Self {
        let level = std::env::var("KMEM_LOG_LEVEL")
            .ok()
            .and_then(|v| parse_level(&v))
            .unwrap_or(DEFAULT_LEVEL);
        let flush = std::env::var("KMEM_FLUSH_EPRINT")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        Self::new(level, flush)
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

impl Log for Kprint {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{} {}", prefix(record.level()), record.args());
        if self.flush {
            let _ = handle.flush();
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().lock().flush();
    }
}

fn prefix(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "[ERROR]",
        log::Level::Warn => "[WARN] ",
        log::Level::Info => "[INFO] ",
        log::Level::Debug => "[DEBUG]",
        log::Level::Trace => "[TRACE]",
    }
}

/// Install the logger from the environment.
///
/// Safe to call more than once; only the first call installs.
pub fn init() {
    let logger = LOGGER.get_or_init(Kprint::from_env);
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
}

/// Parse a level name or number
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    let level = match s.trim().to_lowercase().as_str() {
        "off" | "0" => LevelFilter::Off,
        "error" | "1" => LevelFilter::Error,
        "warn" | "2" => LevelFilter::Warn,
        "info" | "3" => LevelFilter::Info,
        "debug" | "4" => LevelFilter::Debug,
        "trace" | "5" => LevelFilter::Trace,
        _ => return None,
    };
    Some(level)
}

/// "1", "true", "yes", "on" (any case) are true
pub fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
