//! Error types for kernel memory inspection
//!
//! Every variant is fatal to a run. Expected absences (a vnode with no
//! name-cache entry, a page with no object) are data, not errors.

use crate::addr::KAddr;
use thiserror::Error;

/// Result type for kernel memory operations
pub type KmemResult<T> = Result<T, KmemError>;

/// Errors that can occur while reading or interpreting kernel memory
#[derive(Debug, Error)]
pub enum KmemError {
    /// A null pointer was handed to the accessor
    #[error("zero address for {what}")]
    InvalidAddress { what: &'static str },

    /// The memory source refused to map or unmap a window
    #[error("{op}() of {what} at {addr:#x} failed: {source}")]
    MemoryAccess {
        op: &'static str,
        what: &'static str,
        addr: u64,
        #[source]
        source: std::io::Error,
    },

    /// A required kernel symbol is absent
    #[error("kernel symbol `{name}` not found")]
    SymbolNotFound { name: String },

    /// A VM object carries a type code outside the known set
    #[error("unknown object type {code} for vm object {addr}")]
    UnknownObjectKind { addr: KAddr, code: u8 },

    /// A vnode without a cached name has a type we cannot describe
    #[error("unknown vnode type {vtype} for vnode {addr}")]
    UnknownNodeType { addr: KAddr, vtype: i32 },

    /// A page queue list did not end: it revisited a page or outgrew the page array
    #[error("page queue {queue} does not terminate: page {addr} after {examined} pages")]
    QueueCycle { queue: u8, addr: KAddr, examined: u64 },

    /// The same address was inserted into a cache twice
    #[error("duplicate {cache} key {addr}")]
    DuplicateKey { cache: &'static str, addr: KAddr },

    /// A field offset lies outside the window read for its record
    #[error("{what}: field at offset {offset} exceeds {len}-byte window")]
    ShortRecord {
        what: &'static str,
        offset: usize,
        len: usize,
    },

    /// Opening the memory device or a symbol/layout file failed
    #[error("open({path}): {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The requested backend does not exist on this platform
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// Malformed kernel layout or layout override
    #[error("layout: {0}")]
    Layout(String),

    /// Invalid run configuration
    #[error("config: {0}")]
    Config(String),

    /// Writing the report failed
    #[error("output: {0}")]
    Output(#[from] std::io::Error),
}

impl KmemError {
    /// Build a `MemoryAccess` error from the raw OS error of a failed call
    pub fn access(op: &'static str, what: &'static str, addr: u64, source: std::io::Error) -> Self {
        Self::MemoryAccess {
            op,
            what,
            addr,
            source,
        }
    }
}
