//! # meminfo
//!
//! Walks a live kernel's resident pages and reports where they come from:
//! how many belong to each kind of VM object, and, for file-backed pages,
//! which file.
//!
//! This crate provides:
//! - `ObjectCache` - one read per distinct VM object, however many pages share it
//! - `VnodeCache` + `PathResolver` - one path reconstruction per distinct vnode
//! - `sweep` - the physical page array and page queue walks
//! - `Report` - per-kind, per-file and act-count tallies and their printers
//! - `Scanner` - wires a memory source, a symbol resolver and a layout together
//!
//! All state lives for one run. Once an object or vnode has been seen, later
//! pages get the same answer even if the kernel has changed underneath.

pub mod config;
pub mod objects;
pub mod path;
pub mod vnodes;
pub mod sweep;
pub mod report;
pub mod scanner;

#[cfg(test)]
mod fixture;

// Re-exports
pub use config::{ScanConfig, WalkMode};
pub use objects::{ObjectCache, ObjectEntry};
pub use path::{PathBuffer, PathResolver};
pub use report::{Report, ReportOptions};
pub use scanner::Scanner;
pub use sweep::SweepStats;
pub use vnodes::{VnodeCache, VnodeEntry};
