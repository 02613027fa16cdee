//! Concurrency-safe cache sharing one backend across threads.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use statcache_vfs::{Vfs, VfsError, VfsFile};
use tracing::debug;

use crate::entry::{DirListing, EntryState, Snapshot};
use crate::error::{Error, StaleError};
use crate::parse::Parser;
use crate::path::normalize_path;
use crate::registry::{DIR_CAPACITY, FILE_CAPACITY, Registry};

/// One path's state behind its own lock.
#[derive(Debug)]
struct SyncEntry<V> {
    state: RwLock<EntryState<V>>,
}

impl<V> Default for SyncEntry<V> {
    fn default() -> Self {
        Self {
            state: RwLock::new(EntryState::default()),
        }
    }
}

impl<V: Clone> SyncEntry<V> {
    /// Double-checked fetch: shared lock for the age test, exclusive lock
    /// for everything else.
    ///
    /// Callers that find the entry fresh return without writer contention.
    /// The rest serialize on the exclusive lock, where the age test runs
    /// again: whoever waited behind a successful refresh finds the entry
    /// fresh and performs no filesystem work of its own.
    fn get(
        &self,
        open: impl FnOnce() -> Result<Box<dyn VfsFile>, VfsError>,
        read: impl FnOnce(&mut dyn VfsFile) -> Result<V, Error>,
        max_age: Duration,
    ) -> Result<V, StaleError<V>> {
        if let Some(value) = self.state.read().unwrap().fresh_value(max_age) {
            return Ok(value);
        }
        self.state.write().unwrap().get(open, read, max_age)
    }

    fn snapshot(&self) -> Snapshot<V> {
        self.state.read().unwrap().snapshot()
    }
}

/// Entry registry plus the default window, behind one lock.
///
/// The window is duplicated into each table so a single shared-lock
/// acquisition covers both the entry lookup and the default-window read.
#[derive(Debug)]
struct Table<V> {
    inner: RwLock<TableState<V>>,
}

#[derive(Debug)]
struct TableState<V> {
    registry: Registry<Arc<SyncEntry<V>>>,
    max_age: Duration,
}

impl<V: Clone> Table<V> {
    fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            inner: RwLock::new(TableState {
                registry: Registry::new(capacity),
                max_age,
            }),
        }
    }

    /// Look up `key`, then run the freshness engine with no registry lock
    /// held.
    ///
    /// A miss runs the engine on a fresh, unpublished entry; it is
    /// inserted only after its first load succeeds, overwriting whatever a
    /// racing first access published in the interim. An already published
    /// entry stays published when a refresh fails, which is what keeps
    /// stale values available here.
    fn fetch(
        &self,
        key: &str,
        override_age: Option<Duration>,
        open: impl FnOnce() -> Result<Box<dyn VfsFile>, VfsError>,
        read: impl FnOnce(&mut dyn VfsFile) -> Result<V, Error>,
    ) -> Result<V, StaleError<V>> {
        let (entry, max_age, published) = {
            let state = self.inner.read().unwrap();
            let max_age = override_age.unwrap_or(state.max_age);
            match state.registry.get(key) {
                Some(entry) => (Arc::clone(entry), max_age, true),
                None => (Arc::new(SyncEntry::default()), max_age, false),
            }
        };

        let result = entry.get(open, read, max_age);

        if !published && result.is_ok() {
            self.inner
                .write()
                .unwrap()
                .registry
                .insert(key.to_owned(), entry);
        }
        result
    }

    /// Registry shared lock, then entry shared lock. Nothing ever takes
    /// them in the opposite order.
    fn snapshot(&self, key: &str) -> Option<Snapshot<V>> {
        self.inner
            .read()
            .unwrap()
            .registry
            .get(key)
            .map(|entry| entry.snapshot())
    }

    fn clear(&self) {
        self.inner.write().unwrap().registry.clear();
    }
}

/// Concurrency-safe cache of parsed file contents and directory listings.
///
/// The same policy as [`FsCache`](crate::FsCache), shared across threads
/// without external locking:
/// - each entry guards its state with its own `RwLock`, so refreshes of
///   one path serialize while fresh hits take only a shared lock
/// - each registry sits behind its own `RwLock`, held for lookups and
///   inserts but never while filesystem work runs
/// - a first load is published to its registry only once it succeeds
///
/// Unlike `FsCache`, a failing refresh keeps the entry: later calls keep
/// receiving the stale value (fresh hits within the window, or inside the
/// error after it) until a refresh succeeds.
pub struct SharedFsCache<T> {
    fs: Arc<dyn Vfs>,
    parser: Box<dyn Parser<T>>,
    files: Table<Arc<T>>,
    dirs: Table<DirListing>,
}

impl<T> SharedFsCache<T> {
    /// A shared cache over `fs` that parses files with `parser` and
    /// considers entries fresh for `max_age` after a load.
    pub fn new(fs: Arc<dyn Vfs>, parser: impl Parser<T> + 'static, max_age: Duration) -> Self {
        Self {
            fs,
            parser: Box::new(parser),
            files: Table::new(FILE_CAPACITY, max_age),
            dirs: Table::new(DIR_CAPACITY, max_age),
        }
    }

    /// The parsed content of the file at `path`, using the default window.
    ///
    /// # Errors
    ///
    /// Open, stat, and parse failures are returned verbatim, with the last
    /// known-good value in [`StaleError::stale`] when one exists. The
    /// entry is kept, so the stale value stays available to later calls.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn get_file(&self, path: &str) -> Result<Arc<T>, StaleError<Arc<T>>> {
        self.fetch_file(path, None)
    }

    /// Like [`get_file`](Self::get_file), with a one-off freshness window.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn get_file_with_max_age(
        &self,
        path: &str,
        max_age: Duration,
    ) -> Result<Arc<T>, StaleError<Arc<T>>> {
        self.fetch_file(path, Some(max_age))
    }

    /// The listing of the directory at `path`, using the default window.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn get_dir(&self, path: &str) -> Result<DirListing, StaleError<DirListing>> {
        self.fetch_dir(path, None)
    }

    /// Like [`get_dir`](Self::get_dir), with a one-off freshness window.
    ///
    /// # Errors
    ///
    /// As for [`get_file`](Self::get_file).
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn get_dir_with_max_age(
        &self,
        path: &str,
        max_age: Duration,
    ) -> Result<DirListing, StaleError<DirListing>> {
        self.fetch_dir(path, Some(max_age))
    }

    fn fetch_file(
        &self,
        path: &str,
        max_age: Option<Duration>,
    ) -> Result<Arc<T>, StaleError<Arc<T>>> {
        let key = normalize_path(path);
        let result = self.files.fetch(
            &key,
            max_age,
            || self.fs.open(&key),
            |file| self.parser.parse(file).map(Arc::new).map_err(Error::Parse),
        );
        if let Err(e) = &result {
            debug!(path = %key, error = %e, "file fetch failed");
        }
        result
    }

    fn fetch_dir(
        &self,
        path: &str,
        max_age: Option<Duration>,
    ) -> Result<DirListing, StaleError<DirListing>> {
        let key = normalize_path(path);
        let result = self.dirs.fetch(
            &key,
            max_age,
            || self.fs.open(&key),
            |file| file.read_dir().map(DirListing::from).map_err(Error::Fs),
        );
        if let Err(e) = &result {
            debug!(path = %key, error = %e, "directory fetch failed");
        }
        result
    }

    /// Inspection view of the file entry at `path`, without I/O.
    ///
    /// `None` if no fetch of the path ever succeeded.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn file_snapshot(&self, path: &str) -> Option<Snapshot<Arc<T>>> {
        self.files.snapshot(&normalize_path(path))
    }

    /// Inspection view of the directory entry at `path`, without I/O.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn dir_snapshot(&self, path: &str) -> Option<Snapshot<DirListing>> {
        self.dirs.snapshot(&normalize_path(path))
    }

    /// The default freshness window.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.files.inner.read().unwrap().max_age
    }

    /// Change the default freshness window for subsequent fetches.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn set_max_age(&self, max_age: Duration) {
        // Both copies move under both exclusive locks, files before dirs,
        // so no fetch can observe a half-applied default.
        let mut files = self.files.inner.write().unwrap();
        let mut dirs = self.dirs.inner.write().unwrap();
        files.max_age = max_age;
        dirs.max_age = max_age;
    }

    /// Forget every cached file entry.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn clear_files(&self) {
        debug!("clearing file entries");
        self.files.clear();
    }

    /// Forget every cached directory entry.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn clear_dirs(&self) {
        debug!("clearing directory entries");
        self.dirs.clear();
    }

    /// Forget everything, directories first.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn clear(&self) {
        self.clear_dirs();
        self.clear_files();
    }
}

impl<T> std::fmt::Debug for SharedFsCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFsCache")
            .field("max_age", &self.max_age())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use statcache_vfs::MemFs;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::parse::ParseError;

    assert_impl_all!(SharedFsCache<serde_json::Value>: Send, Sync);
    assert_impl_all!(SharedFsCache<String>: Send, Sync, std::fmt::Debug);

    const MINUTE: Duration = Duration::from_secs(60);

    fn text_cache(fs: &Arc<MemFs>, max_age: Duration) -> (SharedFsCache<String>, Arc<AtomicUsize>) {
        let parses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&parses);
        let parser = move |file: &mut dyn VfsFile| -> Result<String, ParseError> {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            Ok(text)
        };
        let fs = Arc::clone(fs) as Arc<dyn Vfs>;
        (SharedFsCache::new(fs, parser, max_age), parses)
    }

    #[test]
    fn test_fetch_and_fresh_hit() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let (cache, parses) = text_cache(&fs, MINUTE);

        let first = cache.get_file("/a.txt").unwrap();
        let second = cache.get_file("/a.txt").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fs.open_count(), 1);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        assert!(cache.file_snapshot("/a.txt").unwrap().is_loaded());
    }

    #[test]
    fn test_error_keeps_entry_and_stale_value() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let (cache, _) = text_cache(&fs, Duration::ZERO);

        cache.get_file("/a.txt").unwrap();
        fs.remove("/a.txt");

        // Errors repeat, and every one still offers the stale value.
        for _ in 0..2 {
            let err = cache.get_file("/a.txt").unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(**err.stale().unwrap(), *"alpha");
        }
        assert!(cache.file_snapshot("/a.txt").unwrap().is_loaded());
    }

    #[test]
    fn test_deleted_file_served_until_window_expires() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let (cache, _) = text_cache(&fs, MINUTE);

        cache.get_file("/a.txt").unwrap();
        fs.remove("/a.txt");

        // Within the window the deletion is simply not noticed.
        assert_eq!(*cache.get_file("/a.txt").unwrap(), "alpha");

        // Forcing revalidation surfaces it, stale value attached.
        let err = cache
            .get_file_with_max_age("/a.txt", Duration::ZERO)
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(**err.stale().unwrap(), *"alpha");
    }

    #[test]
    fn test_failed_first_load_is_not_published() {
        let fs = Arc::new(MemFs::new());
        let (cache, _) = text_cache(&fs, MINUTE);

        let err = cache.get_file("/nope.txt").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.stale().is_none());
        assert!(cache.file_snapshot("/nope.txt").is_none());
    }

    #[test]
    fn test_expired_entry_refreshes_exactly_once() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let window = Duration::from_millis(500);
        let (cache, parses) = text_cache(&fs, window);

        let primed = cache.get_file("/a.txt").unwrap();
        assert_eq!(fs.open_count(), 1);

        std::thread::sleep(Duration::from_millis(600));

        const THREADS: usize = 8;
        let barrier = Barrier::new(THREADS);
        let values: Vec<Arc<String>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_file("/a.txt").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // One caller revalidated; everyone else was served under the
        // refreshed window without touching the filesystem.
        assert_eq!(fs.open_count(), 2);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
        for value in &values {
            assert!(Arc::ptr_eq(&primed, value));
        }
    }

    #[test]
    fn test_racing_first_accesses_agree() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let (cache, _) = text_cache(&fs, MINUTE);

        const THREADS: usize = 8;
        let barrier = Barrier::new(THREADS);
        let values: Vec<Arc<String>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_file("/a.txt").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // Racers that miss the registry may each load on their own; the
        // last to publish wins the slot.
        let opens = fs.open_count();
        assert!((1..=THREADS).contains(&opens), "unexpected open count {opens}");
        for value in &values {
            assert_eq!(**value, *"alpha");
        }

        // The surviving entry is fresh, so the race is over for later
        // callers.
        cache.get_file("/a.txt").unwrap();
        assert_eq!(fs.open_count(), opens);
    }

    #[test]
    fn test_set_max_age_applies_to_files_and_dirs() {
        let fs = Arc::new(MemFs::new().with_file("/data/a.txt", "alpha"));
        let (cache, _) = text_cache(&fs, Duration::ZERO);

        cache.get_file("/data/a.txt").unwrap();
        cache.get_dir("/data").unwrap();
        cache.get_file("/data/a.txt").unwrap();
        cache.get_dir("/data").unwrap();
        assert_eq!(fs.open_count(), 4);

        cache.set_max_age(MINUTE);
        assert_eq!(cache.max_age(), MINUTE);

        // Both entries were revalidated moments ago, so under the wider
        // window they are fresh as they stand and no call below opens
        // anything.
        cache.get_file("/data/a.txt").unwrap();
        cache.get_dir("/data").unwrap();
        cache.get_file("/data/a.txt").unwrap();
        cache.get_dir("/data").unwrap();
        assert_eq!(fs.open_count(), 4);
    }

    #[test]
    fn test_clear_forgets_entries() {
        let fs = Arc::new(MemFs::new().with_file("/data/a.txt", "alpha"));
        let (cache, parses) = text_cache(&fs, MINUTE);

        cache.get_file("/data/a.txt").unwrap();
        cache.get_dir("/data").unwrap();

        cache.clear();
        assert!(cache.file_snapshot("/data/a.txt").is_none());
        assert!(cache.dir_snapshot("/data").is_none());

        cache.get_file("/data/a.txt").unwrap();
        assert_eq!(parses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_window_override_is_one_off() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "old"));
        let (cache, _) = text_cache(&fs, MINUTE);

        cache.get_file("/a.txt").unwrap();
        fs.write("/a.txt", "new");

        assert_eq!(*cache.get_file("/a.txt").unwrap(), "old");
        assert_eq!(
            *cache.get_file_with_max_age("/a.txt", Duration::ZERO).unwrap(),
            "new"
        );
        assert_eq!(cache.max_age(), MINUTE);
        assert_eq!(*cache.get_file("/a.txt").unwrap(), "new");
    }

    #[test]
    fn test_dir_error_keeps_listing_available() {
        let fs = Arc::new(
            MemFs::new()
                .with_file("/data/a.json", "{}")
                .with_file("/data/b.json", "{}"),
        );
        let (cache, _) = text_cache(&fs, Duration::ZERO);

        let listing = cache.get_dir("/data").unwrap();
        assert_eq!(listing.len(), 2);
        fs.remove("/data");

        for _ in 0..2 {
            let err = cache.get_dir("/data").unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(err.stale().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_refresh_failures_resurface_until_one_succeeds() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "ok"));
        let parser = |file: &mut dyn VfsFile| -> Result<String, ParseError> {
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            if text.contains('!') {
                return Err("exclamations are not allowed".into());
            }
            Ok(text)
        };
        let backend = Arc::clone(&fs) as Arc<dyn Vfs>;
        let cache = SharedFsCache::new(backend, parser, Duration::ZERO);

        cache.get_file("/a.txt").unwrap();
        fs.write("/a.txt", "bad!");

        for _ in 0..2 {
            let err = cache.get_file("/a.txt").unwrap_err();
            assert_eq!(err.to_string(), "exclamations are not allowed");
            assert_eq!(**err.stale().unwrap(), *"ok");
        }

        fs.write("/a.txt", "fine");
        assert_eq!(*cache.get_file("/a.txt").unwrap(), "fine");
    }

    #[test]
    fn test_fetches_racing_clears_stay_consistent() {
        let fs = Arc::new(MemFs::new().with_file("/a.txt", "alpha"));
        let (cache, _) = text_cache(&fs, Duration::from_millis(1));

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let value = cache.get_file("/a.txt").unwrap();
                        assert_eq!(*value, "alpha");
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    cache.clear();
                    cache.set_max_age(Duration::from_millis(1));
                    thread::yield_now();
                }
            });
        });
    }
}
