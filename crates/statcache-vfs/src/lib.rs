//! Filesystem abstraction for the statcache parse cache.
//!
//! This crate provides a [`Vfs`] trait for abstracting open/stat/list access
//! to a file tree from the underlying backend. This enables:
//!
//! - **Unit testing** without touching the real filesystem
//! - **Backend flexibility** (host directory, in-memory, archives)
//! - **Clean separation** between cache freshness logic and I/O operations
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Vfs`] trait with a single `open()` entry point returning a handle
//! - [`VfsFile`] handle trait with `read`/`stat`/`read_dir`, released on drop
//! - [`OsFs`] implementation serving a host directory
//! - [`MemFs`] for testing (behind `mem` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use statcache_vfs::{OsFs, Vfs};
//!
//! let fs = OsFs::new("data");
//! let mut handle = fs.open("/config.json")?;
//! let stat = handle.stat()?;
//! let mut content = String::new();
//! handle.read_to_string(&mut content)?;
//! ```

#[cfg(feature = "mem")]
mod mem;
mod os;
mod vfs;

#[cfg(feature = "mem")]
pub use mem::MemFs;
pub use os::OsFs;
pub use vfs::{DirEntry, EntryKind, Stat, Vfs, VfsError, VfsErrorKind, VfsFile};
