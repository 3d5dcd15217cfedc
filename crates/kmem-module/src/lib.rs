//! # kmem-module: Default implementations
//!
//! This crate provides the default implementation for every kmem-core
//! trait.
//!
//! ## Default stack
//!
//! | Trait           | Default Impl     | Alternative                    |
//! |-----------------|------------------|--------------------------------|
//! | MemorySource    | DevKmem          | SparseImage (offline, tests)   |
//! | SymbolResolver  | KldSymbols       | MapFileSymbols (System.map/nm) |

pub mod kmem_sys;
pub mod dev_kmem;
pub mod kld_symbols;
pub mod map_symbols;
pub mod sparse_image;

pub use dev_kmem::DevKmem;
pub use kld_symbols::KldSymbols;
pub use map_symbols::MapFileSymbols;
pub use sparse_image::SparseImage;
