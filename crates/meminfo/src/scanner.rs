//! One scan, start to finish.

use kmem_core::error::KmemResult;
use kmem_core::{KernelLayout, MemorySource, PageRecord, SymbolResolver};

use crate::config::{ScanConfig, WalkMode};
use crate::report::Report;
use crate::sweep::{sweep_array, sweep_queue};

/// Wires a memory source, a symbol resolver and a layout into a page walk.
pub struct Scanner<M, S> {
    mem: M,
    syms: S,
    layout: KernelLayout,
}

impl<M, S> Scanner<M, S>
where
    M: MemorySource,
    S: SymbolResolver,
{
    pub fn new(mem: M, syms: S, layout: KernelLayout) -> Self {
        Self { mem, syms, layout }
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Walk the configured queue and collect the requested tallies.
    ///
    /// Any failure aborts the scan; there are no partial reports.
    pub fn run(&self, config: &ScanConfig) -> KmemResult<Report> {
        config.validate()?;
        let mut report = Report::new(config.reports, config.path_max);
        let (mem, layout) = (&self.mem, &self.layout);
        let visit = |page: &PageRecord| report.account_page(mem, layout, page);

        let stats = match config.walk {
            WalkMode::Array => {
                sweep_array(mem, &self.syms, layout, config.remap_pages, config.queue, visit)?
            }
            WalkMode::Queue => sweep_queue(mem, &self.syms, layout, config.queue, visit)?,
        };
        report.set_stats(stats);

        log::info!(
            "queue {}: {} pages examined, {} counted, {} objects, {} vnodes",
            config.queue,
            stats.examined,
            stats.matched,
            report.objects().len(),
            report.vnodes().len()
        );
        Ok(report)
    }
}
