//! `MapFileSymbols`: symbol table loaded from a text map.
//!
//! Accepts `System.map` / `nm` style lines:
//!
//! ```text
//! ffffffff81a4c2b8 B vm_page_array
//! ffffffff81a4c2c0 B vm_page_array_size
//! ```
//!
//! and the two-column `<addr> <name>` form. Lines that do not parse are
//! skipped; undefined (`U`) entries carry no address and are skipped too.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use kmem_core::addr::KAddr;
use kmem_core::error::{KmemError, KmemResult};
use kmem_core::symbols::SymbolResolver;

#[derive(Debug, Default)]
pub struct MapFileSymbols {
    symbols: HashMap<String, KAddr>,
}

impl MapFileSymbols {
    /// Load from a file
    pub fn open(path: impl AsRef<Path>) -> KmemResult<Self> {
        let path = path.as_ref();
        let open_err = |source| KmemError::Open {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::open(path).map_err(open_err)?;
        let syms = Self::from_reader(std::io::BufReader::new(file)).map_err(|e| match e {
            KmemError::Open { source, .. } => open_err(source),
            other => other,
        })?;
        log::debug!("loaded {} symbols from {}", syms.len(), path.display());
        Ok(syms)
    }

    /// Parse map lines from any reader
    pub fn from_reader<R: BufRead>(reader: R) -> KmemResult<Self> {
        let mut syms = Self::default();
        let mut skipped = 0usize;
        for line in reader.lines() {
            let line = line.map_err(|source| KmemError::Open {
                path: "<symbol map>".into(),
                source,
            })?;
            match parse_line(&line) {
                Some((name, addr)) => {
                    syms.symbols.entry(name.to_string()).or_insert(addr);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::trace!("symbol map: skipped {} lines", skipped);
        }
        Ok(syms)
    }

    pub fn insert(&mut self, name: impl Into<String>, addr: KAddr) {
        self.symbols.insert(name.into(), addr);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(&str, KAddr)> {
    let mut fields = line.split_whitespace();
    let addr = fields.next()?;
    let second = fields.next()?;
    let name = match fields.next() {
        Some(name) => name,
        None => second,
    };
    let addr = u64::from_str_radix(addr.trim_start_matches("0x"), 16).ok()?;
    Some((name, KAddr::new(addr)?))
}

impl SymbolResolver for MapFileSymbols {
    fn resolve(&self, name: &str) -> KmemResult<KAddr> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| KmemError::SymbolNotFound {
                name: name.to_string(),
            })
    }
}
