//! `DevKmem`: default `MemorySource` implementation.
//!
//! Maps kernel virtual memory through `mmap(2)` on `/dev/kmem`. Each window
//! is its own read-only shared mapping, page-aligned around the requested
//! range and unmapped when the window is released or dropped.

use std::fs::File;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::path::Path;
use std::ptr::NonNull;

use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use kmem_core::error::{KmemError, KmemResult};
use kmem_core::source::MemorySource;

use crate::kmem_sys;

/// An open memory device.
pub struct DevKmem {
    file: File,
    page_size: usize,
}

impl DevKmem {
    /// Open the default device, `/dev/kmem`
    pub fn open_default() -> KmemResult<Self> {
        Self::open(kmem_sys::PATH_KMEM)
    }

    /// Open `path` read-only
    pub fn open(path: impl AsRef<Path>) -> KmemResult<Self> {
        let path = path.as_ref();
        let file = kmem_sys::open_kmem(path)?;
        log::debug!("opened {}", path.display());
        Ok(Self {
            file,
            page_size: kmem_sys::page_size(),
        })
    }
}

/// Page-aligned span covering `[addr, addr + len)`: (map offset, skew, map length)
fn span(addr: u64, len: usize, page_size: usize) -> Option<(u64, usize, usize)> {
    let mask = page_size as u64 - 1;
    let aligned = addr & !mask;
    let skew = (addr - aligned) as usize;
    let map_len = skew.checked_add(len)?.checked_add(page_size - 1)? & !(page_size - 1);
    Some((aligned, skew, map_len))
}

/// One live mapping of `/dev/kmem`.
pub struct MappedWindow<'a> {
    base: Option<NonNull<libc::c_void>>,
    map_len: usize,
    skew: usize,
    len: usize,
    what: &'static str,
    addr: u64,
    _source: PhantomData<&'a DevKmem>,
}

impl MappedWindow<'_> {
    fn unmap(&mut self) -> KmemResult<()> {
        let Some(base) = self.base.take() else {
            return Ok(());
        };
        // Safety: `base`/`map_len` came from a successful mmap and the
        // mapping is no longer referenced once `base` is taken.
        unsafe { munmap(base, self.map_len) }
            .map_err(|e| KmemError::access("munmap", self.what, self.addr, e.into()))
    }
}

impl Deref for MappedWindow<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.base {
            // Safety: the mapping is live and at least `skew + len` bytes.
            Some(base) => unsafe {
                std::slice::from_raw_parts(base.as_ptr().cast::<u8>().add(self.skew), self.len)
            },
            None => &[],
        }
    }
}

impl Drop for MappedWindow<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            log::error!("{}", e);
        }
    }
}

impl MemorySource for DevKmem {
    type Window<'a> = MappedWindow<'a>;

    fn map_window(
        &self,
        what: &'static str,
        addr: u64,
        len: usize,
    ) -> KmemResult<MappedWindow<'_>> {
        if addr == 0 {
            return Err(KmemError::InvalidAddress { what });
        }
        let invalid = || {
            KmemError::access("mmap", what, addr, std::io::ErrorKind::InvalidInput.into())
        };
        let (offset, skew, map_len) = span(addr, len, self.page_size).ok_or_else(invalid)?;
        let length = NonZeroUsize::new(map_len).filter(|_| len > 0).ok_or_else(invalid)?;

        // Kernel addresses live in the upper half; the device takes the
        // same bits as a (negative) file offset.
        // Safety: read-only shared mapping of a device we hold open.
        let base = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                &self.file,
                offset as libc::off_t,
            )
        }
        .map_err(|e| KmemError::access("mmap", what, addr, e.into()))?;

        Ok(MappedWindow {
            base: Some(base),
            map_len,
            skew,
            len,
            what,
            addr,
            _source: PhantomData,
        })
    }

    fn release_window(&self, mut window: MappedWindow<'_>) -> KmemResult<()> {
        window.unmap()
    }
}
