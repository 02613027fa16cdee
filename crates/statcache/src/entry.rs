//! Entry state and the freshness decision.
//!
//! One [`EntryState`] records the last successful load of one path. Its
//! `get` method is the whole caching policy: serve fresh, revalidate
//! against metadata, or re-read, in that order. File and directory entries
//! are the same state machine with different value types and read
//! callbacks.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use statcache_vfs::{DirEntry, VfsError, VfsFile};

use crate::error::{Error, StaleError};

/// Shared snapshot of a directory listing.
pub type DirListing = Arc<[DirEntry]>;

/// Inspection view of a cache entry, detached from the cache.
#[derive(Clone, Debug)]
pub enum Snapshot<V> {
    /// Registered, but no load has ever succeeded.
    Unloaded,
    /// Last successful load.
    Loaded {
        /// The value as of the last successful load.
        value: V,
        /// When that load finished.
        loaded_at: Instant,
    },
}

impl<V> Snapshot<V> {
    /// True if a load has succeeded at least once.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    /// The loaded value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Loaded { value, .. } => Some(value),
            Self::Unloaded => None,
        }
    }

    /// When the last successful load happened, if any.
    #[must_use]
    pub fn loaded_at(&self) -> Option<Instant> {
        match self {
            Self::Loaded { loaded_at, .. } => Some(*loaded_at),
            Self::Unloaded => None,
        }
    }
}

/// Result of one successful load.
///
/// `size` and `mtime` are the stat observed by the load that produced
/// `value`; grouping them in one record is what rules out partial updates.
#[derive(Debug)]
struct Loaded<V> {
    value: V,
    loaded_at: Instant,
    size: u64,
    mtime: SystemTime,
}

/// State of one cached path: the last successful load, or nothing yet.
#[derive(Debug)]
pub(crate) struct EntryState<V> {
    loaded: Option<Loaded<V>>,
}

impl<V> Default for EntryState<V> {
    fn default() -> Self {
        Self { loaded: None }
    }
}

impl<V: Clone> EntryState<V> {
    /// The cached value, if the last load is younger than `max_age`.
    ///
    /// Pure read; never touches the filesystem. With `Duration::ZERO` this
    /// is always `None`.
    pub(crate) fn fresh_value(&self, max_age: Duration) -> Option<V> {
        let loaded = self.loaded.as_ref()?;
        (loaded.loaded_at.elapsed() < max_age).then(|| loaded.value.clone())
    }

    /// Decide between fast return, metadata revalidation, and full reload.
    ///
    /// In order:
    /// 1. If loaded within `max_age`: return the cached value, no I/O.
    /// 2. `open()` the path; a failure reports stale-on-error.
    /// 3. `stat()` the handle; a failure reports stale-on-error.
    /// 4. If size and mtime both match the last load exactly: refresh the
    ///    load timestamp and return the cached value without re-reading.
    /// 5. Otherwise `read` the handle; only a success overwrites the entry.
    ///
    /// One timestamp is taken on entry and reused wherever the entry's
    /// clock restarts, so the window never silently extends by the I/O
    /// duration.
    pub(crate) fn get(
        &mut self,
        open: impl FnOnce() -> Result<Box<dyn VfsFile>, VfsError>,
        read: impl FnOnce(&mut dyn VfsFile) -> Result<V, Error>,
        max_age: Duration,
    ) -> Result<V, StaleError<V>> {
        let now = Instant::now();

        if let Some(loaded) = &self.loaded
            && now.duration_since(loaded.loaded_at) < max_age
        {
            return Ok(loaded.value.clone());
        }

        // The handle closes when it drops, on every path below.
        let mut file = match open() {
            Ok(file) => file,
            Err(e) => return Err(self.stale(e.into())),
        };

        let stat = match file.stat() {
            Ok(stat) => stat,
            Err(e) => return Err(self.stale(e.into())),
        };

        if let Some(loaded) = &mut self.loaded
            && stat.size == loaded.size
            && stat.mtime == loaded.mtime
        {
            // Unchanged on disk: only the clock restarts.
            loaded.loaded_at = now;
            return Ok(loaded.value.clone());
        }

        let value = match read(file.as_mut()) {
            Ok(value) => value,
            Err(e) => return Err(self.stale(e)),
        };

        self.loaded = Some(Loaded {
            value: value.clone(),
            loaded_at: now,
            size: stat.size,
            mtime: stat.mtime,
        });

        Ok(value)
    }

    /// Inspection view without I/O.
    pub(crate) fn snapshot(&self) -> Snapshot<V> {
        match &self.loaded {
            Some(loaded) => Snapshot::Loaded {
                value: loaded.value.clone(),
                loaded_at: loaded.loaded_at,
            },
            None => Snapshot::Unloaded,
        }
    }

    /// Wrap a failure with the current value as its stale fallback.
    fn stale(&self, error: Error) -> StaleError<V> {
        StaleError {
            stale: self.loaded.as_ref().map(|l| l.value.clone()),
            error,
        }
    }
}
