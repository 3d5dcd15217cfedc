//! `KldSymbols`: default `SymbolResolver` implementation.
//!
//! Asks the running kernel's linker through `kldsym(2)`. FreeBSD only;
//! elsewhere construction fails with `Unsupported` and callers fall back to
//! a map file.

use kmem_core::addr::KAddr;
use kmem_core::error::{KmemError, KmemResult};
use kmem_core::symbols::SymbolResolver;

use crate::kmem_sys;

#[derive(Debug)]
pub struct KldSymbols {
    _priv: (),
}

impl KldSymbols {
    pub fn new() -> KmemResult<Self> {
        if cfg!(target_os = "freebsd") {
            Ok(Self { _priv: () })
        } else {
            Err(KmemError::Unsupported("kldsym(2)"))
        }
    }
}

impl SymbolResolver for KldSymbols {
    fn resolve(&self, name: &str) -> KmemResult<KAddr> {
        let value = kmem_sys::kldsym_lookup(name)?;
        KAddr::new(value).ok_or_else(|| KmemError::SymbolNotFound {
            name: name.to_string(),
        })
    }
}
