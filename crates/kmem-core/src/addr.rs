//! Kernel virtual addresses

use std::fmt;
use std::num::NonZeroU64;

/// An address in the inspected kernel's address space.
///
/// Zero is the kernel's null pointer and is never a valid `KAddr`; raw
/// pointer fields are translated with [`KAddr::new`] at the point they are
/// decoded, so "no link" is always an `Option::None` past that point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct KAddr(NonZeroU64);

impl KAddr {
    /// Translate a raw kernel pointer. Returns `None` for null.
    #[inline]
    pub const fn new(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Raw numeric value
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Address `off` bytes past this one
    #[inline]
    pub fn add(self, off: u64) -> Self {
        Self(self.0.saturating_add(off))
    }
}

impl fmt::Debug for KAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KAddr({:#x})", self.get())
    }
}

impl fmt::Display for KAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.get())
    }
}

impl fmt::LowerHex for KAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.get(), f)
    }
}

impl From<KAddr> for u64 {
    fn from(addr: KAddr) -> u64 {
        addr.get()
    }
}
