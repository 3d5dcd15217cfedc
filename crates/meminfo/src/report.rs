//! Tallies and their printers
//!
//! A `Report` owns the run's caches and counters. Pages are fed in one at
//! a time by a sweep; `write_to` prints whichever tallies were requested:
//!
//! ```text
//! act[0] = 8812                 act counts
//! OBJT_DEFAULT = 1532           object types
//!   OBJT_VNODE = 40211
//! 12	/usr/lib/libc.so.7         vnodes: hits, tab, path
//! ```

use std::io::{self, Write};

use kmem_core::constants::{ACT_MAX, PAGE_SIZE};
use kmem_core::error::{KmemError, KmemResult};
use kmem_core::{KAddr, KernelLayout, MemorySource, ObjectKind, PageRecord};

use crate::objects::ObjectCache;
use crate::sweep::SweepStats;
use crate::vnodes::VnodeCache;

/// Which tallies to collect and print
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Pages per `act_count` value (active queue only)
    pub act_counts: bool,
    /// Pages per VM object kind
    pub object_types: bool,
    /// Pages per file, with reconstructed paths
    pub vnodes: bool,
}

#[derive(Debug)]
pub struct Report {
    options: ReportOptions,
    objects: ObjectCache,
    vnodes: VnodeCache,
    kind_hits: [u64; ObjectKind::COUNT],
    act_counts: [u64; ACT_MAX + 1],
    stats: SweepStats,
}

/// Pages to whole megabytes
fn megabytes(pages: u64) -> u64 {
    pages * PAGE_SIZE / 1024 / 1024
}

impl Report {
    pub fn new(options: ReportOptions, path_max: usize) -> Self {
        Self {
            options,
            objects: ObjectCache::new(),
            vnodes: VnodeCache::new(path_max),
            kind_hits: [0; ObjectKind::COUNT],
            act_counts: [0; ACT_MAX + 1],
            stats: SweepStats::default(),
        }
    }

    /// Count one resident page.
    pub fn account_page<M>(&mut self, mem: &M, layout: &KernelLayout, page: &PageRecord) -> KmemResult<()>
    where
        M: MemorySource + ?Sized,
    {
        if self.options.act_counts {
            let bucket = usize::from(page.act_count).min(ACT_MAX);
            self.act_counts[bucket] += 1;
        }
        if let Some(obj) = page.object {
            self.account_object(mem, layout, obj)?;
        }
        Ok(())
    }

    /// Count one page backed by `obj`.
    pub fn account_object<M>(&mut self, mem: &M, layout: &KernelLayout, obj: KAddr) -> KmemResult<ObjectKind>
    where
        M: MemorySource + ?Sized,
    {
        let entry = self.objects.classify(mem, layout, obj)?;
        if self.options.object_types {
            self.kind_hits[entry.kind.index()] += 1;
        }
        if self.options.vnodes && entry.kind == ObjectKind::Vnode {
            let vp = entry.vnode.ok_or(KmemError::InvalidAddress {
                what: "vm_object.handle",
            })?;
            self.vnodes.resolve(mem, layout, vp)?;
        }
        Ok(entry.kind)
    }

    pub(crate) fn set_stats(&mut self, stats: SweepStats) {
        self.stats = stats;
    }

    pub fn stats(&self) -> SweepStats {
        self.stats
    }

    pub fn objects(&self) -> &ObjectCache {
        &self.objects
    }

    pub fn vnodes(&self) -> &VnodeCache {
        &self.vnodes
    }

    /// Pages of `kind` counted so far
    pub fn kind_hits(&self, kind: ObjectKind) -> u64 {
        self.kind_hits[kind.index()]
    }

    /// `(kind, pages)` for all seven kinds, in typecode order
    pub fn kind_counts(&self) -> impl Iterator<Item = (ObjectKind, u64)> + '_ {
        ObjectKind::ALL.into_iter().map(|kind| (kind, self.kind_hits(kind)))
    }

    /// `(act_count, pages)` for every bucket, zero or not
    pub fn act_counts(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.act_counts.iter().copied().enumerate()
    }

    /// Print the requested tallies: act counts, object kinds, then files.
    /// Lines whose value is zero after unit conversion are left out.
    pub fn write_to<W: Write>(&self, out: &mut W, in_megabytes: bool) -> io::Result<()> {
        let unit = |n: u64| if in_megabytes { megabytes(n) } else { n };

        // always in pages
        if self.options.act_counts {
            for (i, n) in self.act_counts().filter(|&(_, n)| n != 0) {
                writeln!(out, "act[{}] = {}", i, n)?;
            }
        }
        if self.options.object_types {
            for (kind, pages) in self.kind_counts() {
                let n = unit(pages);
                if n != 0 {
                    writeln!(out, "{:>12} = {}", kind.name(), n)?;
                }
            }
        }
        if self.options.vnodes {
            for (_, entry) in self.vnodes.iter() {
                let n = unit(entry.hits());
                if n != 0 {
                    writeln!(out, "{}\t{}", n, entry.path())?;
                }
            }
        }
        Ok(())
    }
}
