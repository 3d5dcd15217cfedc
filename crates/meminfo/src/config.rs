//! Run configuration
//!
//! Built from defaults, then environment (`ScanConfig::from_env`), then
//! whatever the command line sets on top.
//!
//! # Environment Variables
//!
//! - `KMEM_DEVICE` - memory device (default `/dev/kmem`)
//! - `KMEM_SYMBOLS` - symbol map file used instead of `kldsym(2)`
//! - `KMEM_LAYOUT` - kernel layout override file
//! - `KMEM_REMAP_PAGES` - page records per array window (default 10000)
//! - `KMEM_PATH_MAX` - path buffer size including NUL (default 1024)

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;

use kmem_core::constants::{MAXPATHLEN, PQ_ACTIVE, PQ_INACTIVE};
use kmem_core::error::{KmemError, KmemResult};
use kmem_core::KernelLayout;

use crate::report::ReportOptions;

/// Page records mapped per window of the physical page array
pub const DEFAULT_REMAP_PAGES: usize = 10_000;

/// How resident pages are enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkMode {
    /// Sweep `vm_page_array` and keep pages whose queue matches
    #[default]
    Array,
    /// Follow the selected queue's list from `vm_page_queues`
    Queue,
}

impl FromStr for WalkMode {
    type Err = KmemError;

    fn from_str(s: &str) -> KmemResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "array" => Ok(WalkMode::Array),
            "queue" => Ok(WalkMode::Queue),
            other => Err(KmemError::Config(format!("unknown walk mode `{}`", other))),
        }
    }
}

/// Configuration for one scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub walk: WalkMode,

    /// Page queue to count (`PQ_INACTIVE` or `PQ_ACTIVE`)
    pub queue: u8,

    /// Which tallies to collect
    pub reports: ReportOptions,

    /// Print page counts as megabytes
    pub megabytes: bool,

    /// Memory device
    pub device: PathBuf,

    /// Symbol map file; `None` asks the kernel linker
    pub symbols: Option<PathBuf>,

    /// Layout override file
    pub layout: Option<PathBuf>,

    /// Page records per array window
    pub remap_pages: usize,

    /// Path buffer size, including the terminating NUL
    pub path_max: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            walk: WalkMode::Array,
            queue: PQ_ACTIVE,
            reports: ReportOptions::default(),
            megabytes: false,
            device: PathBuf::from("/dev/kmem"),
            symbols: None,
            layout: None,
            remap_pages: DEFAULT_REMAP_PAGES,
            path_max: MAXPATHLEN,
        }
    }
}

fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `KMEM_*` environment overrides applied
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            device: env_path("KMEM_DEVICE").unwrap_or(defaults.device),
            symbols: env_path("KMEM_SYMBOLS"),
            layout: env_path("KMEM_LAYOUT"),
            remap_pages: env_get("KMEM_REMAP_PAGES", defaults.remap_pages),
            path_max: env_get("KMEM_PATH_MAX", defaults.path_max),
            ..defaults
        }
    }

    pub fn walk(mut self, walk: WalkMode) -> Self {
        self.walk = walk;
        self
    }

    pub fn queue(mut self, queue: u8) -> Self {
        self.queue = queue;
        self
    }

    pub fn reports(mut self, reports: ReportOptions) -> Self {
        self.reports = reports;
        self
    }

    pub fn megabytes(mut self, enable: bool) -> Self {
        self.megabytes = enable;
        self
    }

    pub fn device(mut self, path: impl Into<PathBuf>) -> Self {
        self.device = path.into();
        self
    }

    pub fn symbols(mut self, path: impl Into<PathBuf>) -> Self {
        self.symbols = Some(path.into());
        self
    }

    pub fn layout(mut self, path: impl Into<PathBuf>) -> Self {
        self.layout = Some(path.into());
        self
    }

    pub fn remap_pages(mut self, n: usize) -> Self {
        self.remap_pages = n;
        self
    }

    pub fn path_max(mut self, n: usize) -> Self {
        self.path_max = n;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> KmemResult<()> {
        let r = &self.reports;
        if !(r.act_counts || r.object_types || r.vnodes) {
            return Err(KmemError::Config(
                "at least one of act counts, object types or vnodes must be requested".into(),
            ));
        }
        if self.queue != PQ_INACTIVE && self.queue != PQ_ACTIVE {
            return Err(KmemError::Config(format!(
                "queue must be {} (inactive) or {} (active), got {}",
                PQ_INACTIVE, PQ_ACTIVE, self.queue
            )));
        }
        if r.act_counts && self.queue != PQ_ACTIVE {
            return Err(KmemError::Config(
                "act counts may be used only for the active queue".into(),
            ));
        }
        if self.remap_pages == 0 {
            return Err(KmemError::Config("remap_pages must be at least 1".into()));
        }
        if self.path_max < 2 {
            return Err(KmemError::Config("path_max must be at least 2".into()));
        }
        Ok(())
    }

    /// The kernel layout: defaults plus the override file, if any
    pub fn load_layout(&self) -> KmemResult<KernelLayout> {
        let mut layout = KernelLayout::default();
        if let Some(path) = &self.layout {
            let file = File::open(path).map_err(|source| KmemError::Open {
                path: path.display().to_string(),
                source,
            })?;
            layout.apply_overrides(BufReader::new(file))?;
            log::debug!("applied layout overrides from {}", path.display());
        }
        layout.validate()?;
        Ok(layout)
    }
}
