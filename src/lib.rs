//! Rustscape Cache Library
//!
//! This library reads the Jagex dat2/idx game cache used by the Rustscape
//! server: reassembling logical files from the block chains in the data
//! file, stripping their compression containers, and decoding the
//! reference tables that describe every archive.
//!
//! ## Modules
//!
//! - `buffer` - Big-endian byte cursor with smart int decoding
//! - `cache` - Cache store, block chains, containers and reference tables
//! - `config` - Cache configuration management
//! - `error` - Error types and result definitions
//!
//! ## Example
//!
//! ```no_run
//! use rustscape_cache::cache::CacheStore;
//!
//! # fn main() -> rustscape_cache::Result<()> {
//! let mut store = CacheStore::open("./data/cache")?;
//! let table = store.reference_table(2)?;
//! for archive in &table.archives {
//!     let container = store.read_archive(2, archive)?;
//!     println!("archive {} -> {} bytes", archive.id, container.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cache::{Archive, ArchiveFile, CacheStore, Container, ReferenceTable, SharedCacheStore};
pub use config::CacheConfig;
pub use error::{Result, RustscapeError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
