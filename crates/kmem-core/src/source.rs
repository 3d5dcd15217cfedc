//! Memory source abstraction (the remote memory accessor).
//!
//! A `MemorySource` hands out short-lived, read-only windows onto the
//! inspected address space. Every access is a strict bracket:
//! map → decode → release. [`with_window`] is the only way records are read
//! and guarantees the release on every exit path, including decode errors.
//!
//! # Implementors
//!
//! - `DevKmem` (kmem-module): `mmap(2)` of `/dev/kmem`, one mapping per window.
//! - `SparseImage` (kmem-module): in-memory image of selected regions.

use std::ops::Deref;

use crate::addr::KAddr;
use crate::error::{KmemError, KmemResult};

/// A byte-addressable, read-only view of another address space.
///
/// Implementations need not be thread-safe; a run owns its source
/// exclusively.
pub trait MemorySource {
    /// A mapped window. Dereferences to exactly the requested bytes.
    type Window<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    /// Map `len` bytes starting at `addr`.
    ///
    /// `addr == 0` must fail with [`KmemError::InvalidAddress`] without
    /// touching the underlying source.
    fn map_window(&self, what: &'static str, addr: u64, len: usize)
        -> KmemResult<Self::Window<'_>>;

    /// Release a window obtained from [`map_window`](Self::map_window).
    ///
    /// Dropping a window also releases it, but only this path reports a
    /// failed release.
    fn release_window(&self, window: Self::Window<'_>) -> KmemResult<()>;
}

/// Map a window, decode it, release it.
///
/// The window is released before the decode result is returned, whether or
/// not decoding succeeded. When both fail, the decode error is returned and
/// the release error is logged.
pub fn with_window<M, T, F>(
    mem: &M,
    what: &'static str,
    addr: u64,
    len: usize,
    decode: F,
) -> KmemResult<T>
where
    M: MemorySource + ?Sized,
    F: FnOnce(Bytes<'_>) -> KmemResult<T>,
{
    if addr == 0 {
        return Err(KmemError::InvalidAddress { what });
    }
    let window = mem.map_window(what, addr, len)?;
    let decoded = decode(Bytes::new(what, &window));
    let released = mem.release_window(window);
    match (decoded, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        // the decode error names the record; keep it
        (Err(e), Err(release)) => {
            log::error!("{}", release);
            Err(e)
        }
    }
}

/// Bounds-checked, native-endian field reads over one window.
#[derive(Clone, Copy)]
pub struct Bytes<'a> {
    what: &'static str,
    data: &'a [u8],
}

impl<'a> Bytes<'a> {
    pub fn new(what: &'static str, data: &'a [u8]) -> Self {
        Self { what, data }
    }

    /// The whole window
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `len` bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> KmemResult<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(KmemError::ShortRecord {
                what: self.what,
                offset,
                len: self.data.len(),
            })
    }

    /// Sub-view of `len` bytes starting at `offset`
    pub fn sub(&self, offset: usize, len: usize) -> KmemResult<Bytes<'a>> {
        Ok(Bytes::new(self.what, self.slice(offset, len)?))
    }

    fn array<const N: usize>(&self, offset: usize) -> KmemResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Ok(out)
    }

    #[inline]
    pub fn u8_at(&self, offset: usize) -> KmemResult<u8> {
        Ok(self.array::<1>(offset)?[0])
    }

    #[inline]
    pub fn u16_at(&self, offset: usize) -> KmemResult<u16> {
        Ok(u16::from_ne_bytes(self.array(offset)?))
    }

    #[inline]
    pub fn i16_at(&self, offset: usize) -> KmemResult<i16> {
        Ok(i16::from_ne_bytes(self.array(offset)?))
    }

    #[inline]
    pub fn u32_at(&self, offset: usize) -> KmemResult<u32> {
        Ok(u32::from_ne_bytes(self.array(offset)?))
    }

    #[inline]
    pub fn i32_at(&self, offset: usize) -> KmemResult<i32> {
        Ok(i32::from_ne_bytes(self.array(offset)?))
    }

    #[inline]
    pub fn u64_at(&self, offset: usize) -> KmemResult<u64> {
        Ok(u64::from_ne_bytes(self.array(offset)?))
    }

    /// A pointer field, with the kernel's null translated to `None`
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> KmemResult<Option<KAddr>> {
        Ok(KAddr::new(self.u64_at(offset)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// One flat region starting at `base`; counts live windows.
    struct Flat {
        base: u64,
        bytes: Vec<u8>,
        live: Cell<usize>,
        fail_release: bool,
    }

    struct FlatWindow<'a> {
        data: &'a [u8],
        live: &'a Cell<usize>,
    }

    impl Deref for FlatWindow<'_> {
        type Target = [u8];
        fn deref(&self) -> &[u8] {
            self.data
        }
    }

    impl Drop for FlatWindow<'_> {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    impl MemorySource for Flat {
        type Window<'a> = FlatWindow<'a>;

        fn map_window(&self, what: &'static str, addr: u64, len: usize) -> KmemResult<FlatWindow<'_>> {
            if addr == 0 {
                return Err(KmemError::InvalidAddress { what });
            }
            let start = (addr - self.base) as usize;
            let data = self.bytes.get(start..start + len).ok_or_else(|| {
                KmemError::access("mmap", what, addr, std::io::ErrorKind::InvalidInput.into())
            })?;
            self.live.set(self.live.get() + 1);
            Ok(FlatWindow { data, live: &self.live })
        }

        fn release_window(&self, window: FlatWindow<'_>) -> KmemResult<()> {
            drop(window);
            if self.fail_release {
                return Err(KmemError::access(
                    "munmap",
                    "rec",
                    self.base,
                    std::io::ErrorKind::InvalidInput.into(),
                ));
            }
            Ok(())
        }
    }

    fn flat() -> Flat {
        let mut bytes = vec![0u8; 64];
        bytes[8..16].copy_from_slice(&0xffff_f800_0000_4000u64.to_ne_bytes());
        bytes[16..18].copy_from_slice(&(-3i16).to_ne_bytes());
        bytes[20..24].copy_from_slice(&7u32.to_ne_bytes());
        Flat { base: 0x1000, bytes, live: Cell::new(0), fail_release: false }
    }

    #[test]
    fn test_zero_address_fails_fast() {
        let mem = flat();
        let r = with_window(&mem, "vnode", 0, 8, |b| b.u64_at(0));
        assert!(matches!(r, Err(KmemError::InvalidAddress { what: "vnode" })));
        assert_eq!(mem.live.get(), 0);
    }

    #[test]
    fn test_fields_decode_native_endian() {
        let mem = flat();
        let (p, n, v) = with_window(&mem, "rec", 0x1000, 32, |b| {
            Ok((b.ptr_at(8)?, b.i16_at(16)?, b.u32_at(20)?))
        })
        .unwrap();
        assert_eq!(p.map(KAddr::get), Some(0xffff_f800_0000_4000));
        assert_eq!(n, -3);
        assert_eq!(v, 7);
        assert_eq!(mem.live.get(), 0);
    }

    #[test]
    fn test_null_pointer_field_is_none() {
        let mem = flat();
        let p = with_window(&mem, "rec", 0x1000, 32, |b| b.ptr_at(0)).unwrap();
        assert!(p.is_none());
    }

    #[test]
    fn test_window_released_on_decode_error() {
        let mem = flat();
        let r = with_window(&mem, "rec", 0x1000, 16, |b| b.u64_at(12));
        assert!(matches!(r, Err(KmemError::ShortRecord { offset: 12, len: 16, .. })));
        assert_eq!(mem.live.get(), 0);
    }

    #[test]
    fn test_release_error_reported_after_good_decode() {
        let mem = Flat { fail_release: true, ..flat() };
        let r = with_window(&mem, "rec", 0x1000, 16, |b| b.u64_at(8));
        assert!(matches!(r, Err(KmemError::MemoryAccess { op: "munmap", .. })));
        assert_eq!(mem.live.get(), 0);
    }

    #[test]
    fn test_decode_error_wins_over_release_error() {
        let mem = Flat { fail_release: true, ..flat() };
        let r = with_window(&mem, "rec", 0x1000, 16, |b| b.u64_at(12));
        assert!(matches!(r, Err(KmemError::ShortRecord { offset: 12, .. })));
        assert_eq!(mem.live.get(), 0);
    }

    #[test]
    fn test_sub_view_is_bounded() {
        let data = [1u8, 2, 3, 4];
        let b = Bytes::new("x", &data);
        assert_eq!(b.sub(1, 2).unwrap().as_slice(), &[2, 3]);
        assert!(b.sub(3, 2).is_err());
        assert!(b.slice(usize::MAX, 2).is_err());
    }
}
