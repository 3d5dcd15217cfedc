//! Page enumeration
//!
//! Two ways to find the pages of a queue:
//!
//! - [`sweep_array`] reads every record of `vm_page_array` through a
//!   sliding window of `chunk` records and keeps the ones whose queue byte
//!   matches. Exhaustive, and insensitive to list corruption.
//! - [`sweep_queue`] follows the queue's own list from `vm_page_queues`.
//!   Touches only the pages on the queue, but the list may change under us.
//!   A list longer than the page array, or one that revisits a page when
//!   the array size is unknown, fails the sweep.

use std::collections::HashSet;

use kmem_core::error::{KmemError, KmemResult};
use kmem_core::symbols::{VM_PAGE_ARRAY, VM_PAGE_ARRAY_SIZE, VM_PAGE_QUEUES};
use kmem_core::{read_cell, with_window, KernelLayout, MemorySource, PageRecord, SymbolResolver};

/// Counters for one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Page records decoded
    pub examined: u64,
    /// Pages handed to the visitor
    pub matched: u64,
    /// Windows mapped over the page array
    pub chunks: u64,
    /// Queue markers skipped
    pub markers: u64,
}

/// Visit every page of `vm_page_array` that sits on `queue`.
pub fn sweep_array<M, S, F>(
    mem: &M,
    syms: &S,
    layout: &KernelLayout,
    chunk: usize,
    queue: u8,
    mut visit: F,
) -> KmemResult<SweepStats>
where
    M: MemorySource + ?Sized,
    S: SymbolResolver + ?Sized,
    F: FnMut(&PageRecord) -> KmemResult<()>,
{
    if chunk == 0 {
        return Err(KmemError::Config("remap chunk must be at least 1 page".into()));
    }
    let base = read_cell(mem, syms, VM_PAGE_ARRAY)?;
    let count = read_cell(mem, syms, VM_PAGE_ARRAY_SIZE)?;
    let mut stats = SweepStats::default();
    if count == 0 {
        return Ok(stats);
    }
    if base == 0 {
        return Err(KmemError::InvalidAddress { what: VM_PAGE_ARRAY });
    }

    let size = layout.page.size;
    let too_big = || {
        KmemError::Layout(format!(
            "{} = {} pages of {} bytes does not fit the address space",
            VM_PAGE_ARRAY_SIZE, count, size
        ))
    };
    let total = usize::try_from(count).map_err(|_| too_big())?;
    total
        .checked_mul(size)
        .and_then(|bytes| base.checked_add(bytes as u64))
        .ok_or_else(too_big)?;
    log::debug!("{} at {:#x}, {} pages", VM_PAGE_ARRAY, base, total);

    let mut first = 0usize;
    while first < total {
        let n = chunk.min(total - first);
        let addr = base + (first * size) as u64;
        log::trace!("remap {} pages [{}..{}) at {:#x}", n, first, first + n, addr);
        with_window(mem, "vm_page_array", addr, n * size, |b| {
            for i in 0..n {
                let page = PageRecord::decode(layout, b.sub(i * size, size)?)?;
                stats.examined += 1;
                if page.queue == queue {
                    stats.matched += 1;
                    visit(&page)?;
                }
            }
            Ok(())
        })?;
        stats.chunks += 1;
        first += n;
    }
    Ok(stats)
}

/// Visit every page linked on `queue` of `vm_page_queues`.
pub fn sweep_queue<M, S, F>(
    mem: &M,
    syms: &S,
    layout: &KernelLayout,
    queue: u8,
    mut visit: F,
) -> KmemResult<SweepStats>
where
    M: MemorySource + ?Sized,
    S: SymbolResolver + ?Sized,
    F: FnMut(&PageRecord) -> KmemResult<()>,
{
    let queues = syms.resolve(VM_PAGE_QUEUES)?;
    let limit = match read_cell(mem, syms, VM_PAGE_ARRAY_SIZE) {
        Ok(n) => Some(n),
        Err(KmemError::SymbolNotFound { .. }) => None,
        Err(e) => return Err(e),
    };
    let q = &layout.pagequeue;
    let head = queues.add(q.stride.saturating_mul(queue as usize).saturating_add(q.first) as u64);
    log::debug!("{} at {}, queue {} head cell {}", VM_PAGE_QUEUES, queues, queue, head);

    let mut stats = SweepStats::default();
    let mut seen = HashSet::new();
    let mut next = with_window(mem, "vm_pagequeue", head.get(), 8, |b| b.ptr_at(0))?;
    while let Some(addr) = next {
        let looped = match limit {
            Some(limit) => stats.examined >= limit,
            None => !seen.insert(addr),
        };
        if looped {
            return Err(KmemError::QueueCycle {
                queue,
                addr,
                examined: stats.examined,
            });
        }
        let page = PageRecord::read(mem, layout, addr)?;
        stats.examined += 1;
        next = page.next;
        if page.is_marker() {
            stats.markers += 1;
            continue;
        }
        stats.matched += 1;
        visit(&page)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{KernelBuilder, Page};
    use kmem_core::constants::{PQ_ACTIVE, PQ_INACTIVE};
    use kmem_core::KAddr;

    fn objects(k: &mut KernelBuilder, n: usize) -> Vec<KAddr> {
        (0..n).map(|_| k.object(0, None)).collect()
    }

    #[test]
    fn test_array_filters_by_queue_across_chunks() {
        let mut k = KernelBuilder::new();
        let objs = objects(&mut k, 7);
        let pages: Vec<Page> = objs
            .iter()
            .enumerate()
            .map(|(i, o)| Page::new(Some(*o), if i % 2 == 0 { PQ_ACTIVE } else { PQ_INACTIVE }))
            .collect();
        k.page_array(&pages);

        let mut seen = Vec::new();
        let stats = sweep_array(&k.image, &k.symbols, &k.layout, 3, PQ_ACTIVE, |p| {
            seen.push(p.object);
            Ok(())
        })
        .unwrap();

        assert_eq!(stats.examined, 7);
        assert_eq!(stats.matched, 4);
        assert_eq!(stats.chunks, 3);
        assert_eq!(seen, vec![Some(objs[0]), Some(objs[2]), Some(objs[4]), Some(objs[6])]);
        assert_eq!(k.image.live_windows(), 0);
    }

    #[test]
    fn test_array_chunk_larger_than_array() {
        let mut k = KernelBuilder::new();
        let base = k.page_array(&[Page::new(None, PQ_ACTIVE), Page::new(None, PQ_ACTIVE)]);
        let stats = sweep_array(&k.image, &k.symbols, &k.layout, 10_000, PQ_ACTIVE, |_| Ok(())).unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.matched, 2);
        assert_eq!(k.image.reads_at(base.unwrap().get()), 1);
    }

    #[test]
    fn test_empty_array() {
        let mut k = KernelBuilder::new();
        assert_eq!(k.page_array(&[]), None);
        let stats = sweep_array(&k.image, &k.symbols, &k.layout, 16, PQ_ACTIVE, |_| {
            Err(KmemError::Unsupported("visited"))
        })
        .unwrap();
        assert_eq!(stats, SweepStats::default());
    }

    #[test]
    fn test_visitor_error_releases_window() {
        let mut k = KernelBuilder::new();
        k.page_array(&[Page::new(None, PQ_ACTIVE); 4]);
        let err = sweep_array(&k.image, &k.symbols, &k.layout, 2, PQ_ACTIVE, |_| {
            Err(KmemError::Unsupported("stop"))
        })
        .unwrap_err();
        assert!(matches!(err, KmemError::Unsupported("stop")));
        assert_eq!(k.image.live_windows(), 0);
    }

    #[test]
    fn test_array_missing_symbol() {
        let k = KernelBuilder::new();
        let err = sweep_array(&k.image, &k.symbols, &k.layout, 16, PQ_ACTIVE, |_| Ok(())).unwrap_err();
        assert!(matches!(err, KmemError::SymbolNotFound { ref name } if name == VM_PAGE_ARRAY));
    }

    #[test]
    fn test_queue_skips_markers() {
        let mut k = KernelBuilder::new();
        let objs = objects(&mut k, 3);
        k.page_queue(
            PQ_ACTIVE,
            &[
                Page::new(Some(objs[0]), PQ_ACTIVE),
                Page::new(None, PQ_ACTIVE).marker(),
                Page::new(Some(objs[1]), PQ_ACTIVE),
                Page::new(Some(objs[2]), PQ_ACTIVE),
            ],
        );
        let mut seen = Vec::new();
        let stats = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_ACTIVE, |p| {
            seen.push(p.object);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![Some(objs[0]), Some(objs[1]), Some(objs[2])]);
        assert_eq!(stats.examined, 4);
        assert_eq!(stats.markers, 1);
        assert_eq!(stats.matched, 3);
    }

    #[test]
    fn test_queue_selects_head_by_index() {
        let mut k = KernelBuilder::new();
        k.page_queue(PQ_INACTIVE, &[Page::new(None, PQ_INACTIVE); 2]);
        let active = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_ACTIVE, |_| Ok(())).unwrap();
        assert_eq!(active.matched, 0);
        let inactive = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_INACTIVE, |_| Ok(())).unwrap();
        assert_eq!(inactive.matched, 2);
    }

    #[test]
    fn test_queue_longer_than_array_fails() {
        let mut k = KernelBuilder::new();
        let pages = k.page_queue(PQ_ACTIVE, &[Page::new(None, PQ_ACTIVE); 3]);
        k.link(pages[2], pages[0]);
        k.array_size_symbol(10);
        let mut visited = 0;
        let err = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_ACTIVE, |_| {
            visited += 1;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            KmemError::QueueCycle { queue: PQ_ACTIVE, examined: 10, addr } if addr == pages[1]
        ));
        assert_eq!(visited, 10);
    }

    #[test]
    fn test_queue_cycle_without_array_size_fails() {
        let mut k = KernelBuilder::new();
        let pages = k.page_queue(PQ_ACTIVE, &[Page::new(None, PQ_ACTIVE); 3]);
        k.link(pages[2], pages[1]);
        let err = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_ACTIVE, |_| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            KmemError::QueueCycle { examined: 3, addr, .. } if addr == pages[1]
        ));
    }

    #[test]
    fn test_queue_within_array_size() {
        let mut k = KernelBuilder::new();
        k.page_queue(PQ_ACTIVE, &[Page::new(None, PQ_ACTIVE); 3]);
        k.array_size_symbol(3);
        let stats = sweep_queue(&k.image, &k.symbols, &k.layout, PQ_ACTIVE, |_| Ok(())).unwrap();
        assert_eq!(stats.examined, 3);
    }
}
