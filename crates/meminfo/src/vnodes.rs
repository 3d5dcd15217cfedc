//! Vnode path cache
//!
//! Resolves each distinct vnode's path once and counts how many resident
//! pages led to it.

use std::collections::btree_map::{BTreeMap, Entry};

use kmem_core::error::KmemResult;
use kmem_core::{KAddr, KernelLayout, MemorySource};

use crate::path::PathResolver;

/// Per-vnode tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnodeEntry {
    hits: u64,
    path: String,
}

impl VnodeEntry {
    /// Pages attributed to this vnode
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug)]
pub struct VnodeCache {
    entries: BTreeMap<KAddr, VnodeEntry>,
    path_max: usize,
}

impl VnodeCache {
    /// `path_max` is the path buffer size, terminating NUL included
    pub fn new(path_max: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            path_max,
        }
    }

    /// Count one more page for `vp`, resolving its path on first sight.
    ///
    /// A failed resolution leaves the cache untouched.
    pub fn resolve<M>(&mut self, mem: &M, layout: &KernelLayout, vp: KAddr) -> KmemResult<&VnodeEntry>
    where
        M: MemorySource + ?Sized,
    {
        let entry = match self.entries.entry(vp) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let path = PathResolver::new(mem, layout).full_path(vp, self.path_max)?;
                log::debug!("vnode {} -> {}", vp, path.as_str());
                slot.insert(VnodeEntry {
                    hits: 0,
                    path: path.into_string(),
                })
            }
        };
        entry.hits += 1;
        Ok(entry)
    }

    pub fn get(&self, vp: KAddr) -> Option<&VnodeEntry> {
        self.entries.get(&vp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in vnode address order
    pub fn iter(&self) -> impl Iterator<Item = (KAddr, &VnodeEntry)> + '_ {
        self.entries.iter().map(|(vp, entry)| (*vp, entry))
    }
}
