//! Kernel symbol resolution.
//!
//! Symbols are looked up once per run. The addresses they return name a
//! *cell* in kernel memory (a pointer or a length), not the value itself;
//! [`read_cell`] performs that second hop through the memory source.

use crate::addr::KAddr;
use crate::error::KmemResult;
use crate::source::{with_window, MemorySource};

/// Base of the physical page array (`vm_page_t vm_page_array`)
pub const VM_PAGE_ARRAY: &str = "vm_page_array";

/// Number of entries in the physical page array (`long vm_page_array_size`)
pub const VM_PAGE_ARRAY_SIZE: &str = "vm_page_array_size";

/// Array of page queue heads
pub const VM_PAGE_QUEUES: &str = "vm_page_queues";

/// Resolves kernel symbol names to addresses.
pub trait SymbolResolver {
    /// Address of `name` in the running kernel.
    ///
    /// Fails with `SymbolNotFound` when the kernel has no such symbol.
    fn resolve(&self, name: &str) -> KmemResult<KAddr>;
}

impl<T: SymbolResolver + ?Sized> SymbolResolver for &T {
    fn resolve(&self, name: &str) -> KmemResult<KAddr> {
        (**self).resolve(name)
    }
}

impl<T: SymbolResolver + ?Sized> SymbolResolver for Box<T> {
    fn resolve(&self, name: &str) -> KmemResult<KAddr> {
        (**self).resolve(name)
    }
}

/// Resolve `name` and read the 8-byte cell it points at.
pub fn read_cell<M, S>(mem: &M, syms: &S, name: &'static str) -> KmemResult<u64>
where
    M: MemorySource + ?Sized,
    S: SymbolResolver + ?Sized,
{
    let cell = syms.resolve(name)?;
    let value = with_window(mem, name, cell.get(), 8, |b| b.u64_at(0))?;
    log::debug!("symbol {} at {} holds {:#x}", name, cell, value);
    Ok(value)
}
