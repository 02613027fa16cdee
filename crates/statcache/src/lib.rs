//! Stat-validated caching of parsed file contents and directory listings.
//!
//! Wraps a [`Vfs`] backend and remembers, per path, the parsed value or
//! listing together with the size and mtime that produced it. Fetches
//! within the freshness window are served without touching the filesystem;
//! after it, a cheap open plus stat decides between keeping the cached
//! value and re-reading it. Failed fetches hand back the last known-good
//! value inside the error, so callers choose between staleness and
//! failure.
//!
//! # Architecture
//!
//! - [`FsCache`]: single-threaded flavor. Operations take `&mut self`, and
//!   a failed fetch drops its entry.
//! - [`SharedFsCache`]: thread-safe flavor with per-entry double-checked
//!   locking. Entries survive failed refreshes, keeping stale values
//!   available.
//! - [`Parser`]: pluggable decoding of open files into typed values;
//!   [`json::json_parser`] is the stock JSON decoder.
//! - Backends implement [`Vfs`] in the `statcache-vfs` crate; its core
//!   types are re-exported here.
//!
//! ```ignore
//! let fs: Arc<dyn Vfs> = Arc::new(OsFs::new("/etc/app"));
//! let mut cache = FsCache::new(fs, json_parser::<Config>(), Duration::from_secs(2));
//!
//! let config = cache.get_file("/config.json")?;
//! let drop_ins = cache.get_dir("/conf.d")?;
//! ```

mod cache;
mod entry;
mod error;
pub mod json;
mod parse;
mod path;
mod registry;
mod shared;

pub use cache::FsCache;
pub use entry::{DirListing, Snapshot};
pub use error::{Error, StaleError};
pub use parse::{ParseError, Parser};
pub use shared::SharedFsCache;
pub use statcache_vfs::{DirEntry, EntryKind, OsFs, Stat, Vfs, VfsError, VfsErrorKind, VfsFile};
