//! `SparseImage`: in-memory `MemorySource`.
//!
//! Holds a set of non-overlapping regions of another address space. Used
//! for offline snapshots and for building synthetic kernels in tests. Every
//! mapped window is counted per start address, so callers can check how
//! often a record was actually read.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::Deref;

use kmem_core::addr::KAddr;
use kmem_core::error::{KmemError, KmemResult};
use kmem_core::source::MemorySource;

/// Default base for [`SparseImage::alloc`]; looks like an amd64 direct map address
pub const DEFAULT_ALLOC_BASE: KAddr = match KAddr::new(0xffff_f800_0010_0000) {
    Some(addr) => addr,
    None => panic!("null allocation base"),
};

const ALLOC_ALIGN: u64 = 64;

#[derive(Debug)]
pub struct SparseImage {
    regions: BTreeMap<u64, Vec<u8>>,
    next_alloc: KAddr,
    reads: RefCell<BTreeMap<u64, usize>>,
    live: Cell<usize>,
}

impl Default for SparseImage {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseImage {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_alloc: DEFAULT_ALLOC_BASE,
            reads: RefCell::new(BTreeMap::new()),
            live: Cell::new(0),
        }
    }

    /// Add a region at `addr`. Panics if it overlaps an existing one.
    pub fn insert(&mut self, addr: u64, bytes: Vec<u8>) {
        let end = addr + bytes.len() as u64;
        if let Some((&start, region)) = self.regions.range(..end).next_back() {
            assert!(
                start + region.len() as u64 <= addr,
                "region {:#x}+{} overlaps {:#x}",
                addr,
                bytes.len(),
                start
            );
        }
        self.regions.insert(addr, bytes);
    }

    /// Allocate a fresh zeroed region of `len` bytes
    pub fn alloc(&mut self, len: usize) -> KAddr {
        let addr = self.next_alloc;
        let span = (len as u64).max(1).div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN;
        self.next_alloc = addr.add(span + ALLOC_ALIGN);
        self.insert(addr.get(), vec![0; len]);
        addr
    }

    fn region_mut(&mut self, addr: u64, len: usize) -> &mut [u8] {
        let (&start, region) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .unwrap_or_else(|| panic!("write to unmapped {:#x}", addr));
        let off = (addr - start) as usize;
        region
            .get_mut(off..off + len)
            .unwrap_or_else(|| panic!("write past region at {:#x}", addr))
    }

    /// Overwrite bytes inside an existing region
    pub fn write(&mut self, addr: u64, bytes: &[u8]) {
        self.region_mut(addr, bytes.len()).copy_from_slice(bytes);
    }

    pub fn write_u8(&mut self, addr: u64, v: u8) {
        self.write(addr, &[v]);
    }

    pub fn write_u16(&mut self, addr: u64, v: u16) {
        self.write(addr, &v.to_ne_bytes());
    }

    pub fn write_i16(&mut self, addr: u64, v: i16) {
        self.write(addr, &v.to_ne_bytes());
    }

    pub fn write_u32(&mut self, addr: u64, v: u32) {
        self.write(addr, &v.to_ne_bytes());
    }

    pub fn write_i32(&mut self, addr: u64, v: i32) {
        self.write(addr, &v.to_ne_bytes());
    }

    pub fn write_u64(&mut self, addr: u64, v: u64) {
        self.write(addr, &v.to_ne_bytes());
    }

    /// Write a pointer field; `None` writes the kernel's null
    pub fn write_ptr(&mut self, addr: u64, v: Option<KAddr>) {
        self.write_u64(addr, v.map_or(0, KAddr::get));
    }

    /// Number of windows mapped starting exactly at `addr`
    pub fn reads_at(&self, addr: u64) -> usize {
        self.reads.borrow().get(&addr).copied().unwrap_or(0)
    }

    /// Total windows mapped so far
    pub fn total_reads(&self) -> usize {
        self.reads.borrow().values().sum()
    }

    /// Windows currently mapped and not yet released
    pub fn live_windows(&self) -> usize {
        self.live.get()
    }

    fn lookup(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let (&start, region) = self.regions.range(..=addr).next_back()?;
        let off = usize::try_from(addr - start).ok()?;
        region.get(off..off.checked_add(len)?)
    }
}

/// A window onto a `SparseImage` region
pub struct ImageWindow<'a> {
    data: &'a [u8],
    live: &'a Cell<usize>,
}

impl Deref for ImageWindow<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl Drop for ImageWindow<'_> {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

impl MemorySource for SparseImage {
    type Window<'a> = ImageWindow<'a>;

    fn map_window(&self, what: &'static str, addr: u64, len: usize) -> KmemResult<ImageWindow<'_>> {
        if addr == 0 {
            return Err(KmemError::InvalidAddress { what });
        }
        let data = self.lookup(addr, len).ok_or_else(|| {
            KmemError::access(
                "mmap",
                what,
                addr,
                std::io::Error::from_raw_os_error(libc::EFAULT),
            )
        })?;
        *self.reads.borrow_mut().entry(addr).or_insert(0) += 1;
        self.live.set(self.live.get() + 1);
        Ok(ImageWindow {
            data,
            live: &self.live,
        })
    }

    fn release_window(&self, window: ImageWindow<'_>) -> KmemResult<()> {
        drop(window);
        Ok(())
    }
}
