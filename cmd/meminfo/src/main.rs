//! meminfo: where the resident pages of a page queue come from.
//!
//! Run: sudo ./target/release/meminfo -o -v -q 1
//! (reads /dev/kmem; set KMEM_LOG_LEVEL=debug to watch the walk)

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use kmem_core::error::KmemResult;
use kmem_core::{kprint, SymbolResolver};
use kmem_module::{DevKmem, KldSymbols, MapFileSymbols};
use meminfo::{ReportOptions, ScanConfig, Scanner, WalkMode};

/// Report resident pages of a page queue by VM object type and by file.
#[derive(Parser, Debug)]
#[command(name = "meminfo", version, about, long_about = None)]
#[command(group = clap::ArgGroup::new("report").required(true).multiple(true))]
struct Args {
    /// Report about active counts
    #[arg(short = 'a', group = "report")]
    act_counts: bool,

    /// Report in megabytes
    #[arg(short = 'm')]
    megabytes: bool,

    /// Report about object types
    #[arg(short = 'o', group = "report")]
    object_types: bool,

    /// Report about vnode hits
    #[arg(short = 'v', group = "report")]
    vnodes: bool,

    /// Page queue: 0 - PQ_INACTIVE, 1 - PQ_ACTIVE
    #[arg(short = 'q', value_parser = clap::value_parser!(u8).range(0..=1))]
    queue: u8,

    /// How to enumerate pages: `array` or `queue`
    #[arg(long)]
    walk: Option<WalkMode>,

    /// Memory device [env: KMEM_DEVICE]
    #[arg(long)]
    kmem: Option<PathBuf>,

    /// Symbol map file to use instead of kldsym(2) [env: KMEM_SYMBOLS]
    #[arg(long)]
    symbols: Option<PathBuf>,

    /// Kernel layout override file [env: KMEM_LAYOUT]
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Page records mapped per window [env: KMEM_REMAP_PAGES]
    #[arg(long)]
    remap: Option<usize>,
}

impl Args {
    fn into_config(self) -> ScanConfig {
        let mut config = ScanConfig::from_env()
            .queue(self.queue)
            .megabytes(self.megabytes)
            .reports(ReportOptions {
                act_counts: self.act_counts,
                object_types: self.object_types,
                vnodes: self.vnodes,
            });
        if let Some(walk) = self.walk {
            config = config.walk(walk);
        }
        if let Some(path) = self.kmem {
            config = config.device(path);
        }
        if let Some(path) = self.symbols {
            config = config.symbols(path);
        }
        if let Some(path) = self.layout {
            config = config.layout(path);
        }
        if let Some(n) = self.remap {
            config = config.remap_pages(n);
        }
        config
    }
}

fn symbol_resolver(config: &ScanConfig) -> KmemResult<Box<dyn SymbolResolver>> {
    match &config.symbols {
        Some(path) => Ok(Box::new(MapFileSymbols::open(path)?)),
        None => Ok(Box::new(KldSymbols::new()?)),
    }
}

fn run(config: &ScanConfig) -> KmemResult<()> {
    config.validate()?;
    let layout = config.load_layout()?;
    let mem = DevKmem::open(&config.device)?;
    let syms = symbol_resolver(config)?;
    log::info!(
        "scanning {} ({:?} walk, queue {})",
        config.device.display(),
        config.walk,
        config.queue
    );

    let report = Scanner::new(mem, syms, layout).run(config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report.write_to(&mut out, config.megabytes)?;
    out.flush()?;
    Ok(())
}

fn main() {
    kprint::init();
    let config = Args::parse().into_config();
    if let Err(e) = run(&config) {
        eprintln!("meminfo: {}", e);
        process::exit(1);
    }
}
