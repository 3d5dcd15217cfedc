//! VM object identity cache
//!
//! Millions of resident pages point at a few thousand objects. Each
//! distinct object is read and classified once; every later page with the
//! same object is answered from the map without touching kernel memory.

use std::collections::btree_map::{self, BTreeMap};

use kmem_core::error::{KmemError, KmemResult};
use kmem_core::{KAddr, KernelLayout, MemorySource, ObjectKind, ObjectRecord};

/// What we keep per object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectEntry {
    pub kind: ObjectKind,
    /// Owning vnode, for `ObjectKind::Vnode` only
    pub vnode: Option<KAddr>,
}

/// Objects seen during this run, keyed by address
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: BTreeMap<KAddr, ObjectEntry>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the object at `addr`, reading it on first sight only.
    pub fn classify<M>(&mut self, mem: &M, layout: &KernelLayout, addr: KAddr) -> KmemResult<ObjectEntry>
    where
        M: MemorySource + ?Sized,
    {
        if let Some(entry) = self.entries.get(&addr) {
            return Ok(*entry);
        }

        let record = ObjectRecord::read(mem, layout, addr)?;
        let entry = ObjectEntry {
            kind: record.kind,
            vnode: record.vnode,
        };
        log::trace!("vm object {}: {}", addr, entry.kind.name());
        self.insert(addr, entry)?;
        Ok(entry)
    }

    fn insert(&mut self, addr: KAddr, entry: ObjectEntry) -> KmemResult<()> {
        match self.entries.entry(addr) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
            btree_map::Entry::Occupied(_) => Err(KmemError::DuplicateKey {
                cache: "vm object",
                addr,
            }),
        }
    }

    pub fn get(&self, addr: KAddr) -> Option<&ObjectEntry> {
        self.entries.get(&addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in address order
    pub fn iter(&self) -> impl Iterator<Item = (KAddr, &ObjectEntry)> + '_ {
        self.entries.iter().map(|(addr, entry)| (*addr, entry))
    }
}
