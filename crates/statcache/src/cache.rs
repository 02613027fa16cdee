//! Single-threaded cache over one [`Vfs`] backend.

use std::sync::Arc;
use std::time::Duration;

use statcache_vfs::Vfs;
use tracing::debug;

use crate::entry::{DirListing, EntryState, Snapshot};
use crate::error::{Error, StaleError};
use crate::parse::Parser;
use crate::path::normalize_path;
use crate::registry::{DIR_CAPACITY, FILE_CAPACITY, Registry};

/// Cache of parsed file contents and directory listings for one backend.
///
/// Files are parsed into `T` by the configured [`Parser`] and cached as
/// `Arc<T>`; directory listings are cached as [`DirListing`]. Entries are
/// served without filesystem access while younger than the freshness
/// window, then revalidated against `stat` and re-read only when size or
/// mtime changed. A failing fetch reports the last known-good value inside
/// the error and drops the entry, so the next call starts from scratch.
///
/// Operations take `&mut self`; callers that share a cache across threads
/// want [`SharedFsCache`](crate::SharedFsCache) instead.
pub struct FsCache<T> {
    fs: Arc<dyn Vfs>,
    parser: Box<dyn Parser<T>>,
    max_age: Duration,
    files: Registry<EntryState<Arc<T>>>,
    dirs: Registry<EntryState<DirListing>>,
}

impl<T> FsCache<T> {
    /// A cache over `fs` that parses files with `parser` and considers
    /// entries fresh for `max_age` after a load.
    ///
    /// `Duration::ZERO` disables the fast path: every fetch revalidates
    /// against the filesystem, with unchanged files still served from the
    /// cache without re-parsing.
    pub fn new(fs: Arc<dyn Vfs>, parser: impl Parser<T> + 'static, max_age: Duration) -> Self {
        Self {
            fs,
            parser: Box::new(parser),
            max_age,
            files: Registry::new(FILE_CAPACITY),
            dirs: Registry::new(DIR_CAPACITY),
        }
    }

    /// The parsed content of the file at `path`, using the default window.
    ///
    /// # Errors
    ///
    /// Open, stat, and parse failures are returned verbatim, with the last
    /// known-good value in [`StaleError::stale`] when one exists. The
    /// failed entry is forgotten either way.
    pub fn get_file(&mut self, path: &str) -> Result<Arc<T>, StaleError<Arc<T>>> {
        self.get_file_with_max_age(path, self.max_age)
    }

    /// Like [`get_file`](Self::get_file), with a one-off freshness window.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    pub fn get_file_with_max_age(
        &mut self,
        path: &str,
        max_age: Duration,
    ) -> Result<Arc<T>, StaleError<Arc<T>>> {
        let key = normalize_path(path);
        let fs = &self.fs;
        let parser = self.parser.as_ref();
        let result = self.files.entry_mut(&key).get(
            || fs.open(&key),
            |file| parser.parse(file).map(Arc::new).map_err(Error::Parse),
            max_age,
        );
        if let Err(e) = &result {
            debug!(path = %key, error = %e, "file fetch failed, dropping entry");
            self.files.remove(&key);
        }
        result
    }

    /// The listing of the directory at `path`, using the default window.
    ///
    /// The listing reflects the last successful load, not the live
    /// filesystem; changes surface once the entry expires and revalidation
    /// sees a different stat.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    pub fn get_dir(&mut self, path: &str) -> Result<DirListing, StaleError<DirListing>> {
        self.get_dir_with_max_age(path, self.max_age)
    }

    /// Like [`get_dir`](Self::get_dir), with a one-off freshness window.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    pub fn get_dir_with_max_age(
        &mut self,
        path: &str,
        max_age: Duration,
    ) -> Result<DirListing, StaleError<DirListing>> {
        let key = normalize_path(path);
        let fs = &self.fs;
        let result = self.dirs.entry_mut(&key).get(
            || fs.open(&key),
            |file| file.read_dir().map(DirListing::from).map_err(Error::Fs),
            max_age,
        );
        if let Err(e) = &result {
            debug!(path = %key, error = %e, "directory fetch failed, dropping entry");
            self.dirs.remove(&key);
        }
        result
    }

    /// Inspection view of the file entry at `path`, without I/O.
    ///
    /// `None` if the path was never fetched (or its last fetch failed).
    #[must_use]
    pub fn file_snapshot(&self, path: &str) -> Option<Snapshot<Arc<T>>> {
        self.files
            .get(&normalize_path(path))
            .map(EntryState::snapshot)
    }

    /// Inspection view of the directory entry at `path`, without I/O.
    #[must_use]
    pub fn dir_snapshot(&self, path: &str) -> Option<Snapshot<DirListing>> {
        self.dirs
            .get(&normalize_path(path))
            .map(EntryState::snapshot)
    }

    /// The default freshness window.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Change the default freshness window for subsequent fetches.
    pub fn set_max_age(&mut self, max_age: Duration) {
        self.max_age = max_age;
    }

    /// Forget every cached file entry.
    pub fn clear_files(&mut self) {
        debug!("clearing file entries");
        self.files.clear();
    }

    /// Forget every cached directory entry.
    pub fn clear_dirs(&mut self) {
        debug!("clearing directory entries");
        self.dirs.clear();
    }

    /// Forget everything, directories first.
    pub fn clear(&mut self) {
        self.clear_dirs();
        self.clear_files();
    }
}

impl<T> std::fmt::Debug for FsCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsCache")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}
