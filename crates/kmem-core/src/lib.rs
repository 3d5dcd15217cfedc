//! # kmem-core
//!
//! Core types and traits for inspecting a live kernel's memory from
//! userspace.
//!
//! This crate contains no OS-specific code. It defines what a memory
//! source and a symbol resolver must provide, how kernel records are laid
//! out, and how they decode from a bounded byte window. The default
//! implementations (`/dev/kmem`, `kldsym(2)`, map files, in-memory images)
//! live in `kmem-module`.
//!
//! ## Modules
//!
//! - `addr` - Non-null kernel address type
//! - `error` - Error taxonomy shared by every crate in the workspace
//! - `source` - `MemorySource` trait and the scoped window bracket
//! - `symbols` - `SymbolResolver` trait and symbol cell reads
//! - `layout` - Field offsets of the kernel records we decode
//! - `records` - Plain records decoded from windows
//! - `kprint` - stderr backend for the `log` facade

pub mod addr;
pub mod error;
pub mod source;
pub mod symbols;
pub mod layout;
pub mod records;
pub mod kprint;

// Re-exports for convenience
pub use addr::KAddr;
pub use error::{KmemError, KmemResult};
pub use layout::KernelLayout;
pub use records::{
    CdevName, InodeRecord, MountRecord, NameCacheLink, ObjectKind, ObjectRecord, PageRecord,
    VnodeRecord, VnodeType,
};
pub use source::{with_window, Bytes, MemorySource};
pub use symbols::{read_cell, SymbolResolver};

/// Constants of the inspected kernel
pub mod constants {
    /// Page size of the inspected kernel
    pub const PAGE_SIZE: u64 = 4096;

    /// `MAXPATHLEN`, including the terminating NUL
    pub const MAXPATHLEN: usize = 1024;

    /// Highest `act_count` value a page can carry
    pub const ACT_MAX: usize = 64;

    /// `PQ_INACTIVE`
    pub const PQ_INACTIVE: u8 = 0;

    /// `PQ_ACTIVE`
    pub const PQ_ACTIVE: u8 = 1;

    /// Page is a queue scan marker, not a real page
    pub const PG_MARKER: u16 = 0x0010;

    /// Vnode is the root of its filesystem
    pub const VV_ROOT: u32 = 0x0001;
}
