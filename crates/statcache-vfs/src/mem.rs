//! In-memory backend for testing.
//!
//! Provides [`MemFs`] for exercising cache behavior without filesystem
//! access. Modification times come from a logical clock, so tests control
//! them exactly instead of racing the host clock.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::vfs::{DirEntry, EntryKind, Stat, Vfs, VfsError, VfsErrorKind, VfsFile};

/// Backend identifier for error messages.
const BACKEND: &str = "Mem";

/// Unix-second base of the logical clock. Every mutation advances the clock
/// by one second, so successive writes always carry distinct mtimes.
const CLOCK_BASE_SECS: u64 = 1_700_000_000;

/// Extract the parent key of a key (`"/a/b"` -> `"/a"`, `"/a"` -> `"/"`).
fn parent(key: &str) -> Option<String> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/".to_owned()),
        Some(i) => Some(key[..i].to_owned()),
        None => None,
    }
}

/// Canonicalize a path into key form: rooted, no empty components.
///
/// `.` and `..` are not interpreted here; callers hand in already-normalized
/// paths, this only forgives missing or doubled separators.
fn key(path: &str) -> String {
    let joined = path
        .split('/')
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        "/".to_owned()
    } else {
        format!("/{joined}")
    }
}

/// Stored file node.
#[derive(Debug)]
struct MemFileData {
    bytes: Vec<u8>,
    mtime: SystemTime,
}

/// Mutable backend state behind the lock.
#[derive(Debug)]
struct MemState {
    files: BTreeMap<String, MemFileData>,
    dirs: BTreeMap<String, SystemTime>,
    clock: u64,
}

impl MemState {
    /// Advance the logical clock and return the new timestamp.
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_secs(CLOCK_BASE_SECS + self.clock)
    }

    /// Refresh a directory's mtime (creating it if needed).
    fn bump(&mut self, dir: &str) {
        let now = self.tick();
        self.dirs.insert(dir.to_owned(), now);
    }

    /// Create a directory chain, bumping the parent of each new directory.
    fn ensure_dir(&mut self, dir: &str) {
        if dir == "/" || self.dirs.contains_key(dir) {
            return;
        }
        if let Some(p) = parent(dir) {
            self.ensure_dir(&p);
        }
        let now = self.tick();
        self.dirs.insert(dir.to_owned(), now);
        if let Some(p) = parent(dir) {
            self.bump(&p);
        }
    }

    /// Insert or replace a file. Only a newly created file changes its
    /// parent directory's mtime, matching host filesystem behavior.
    fn write_at(&mut self, key: String, bytes: Vec<u8>, mtime: SystemTime) {
        if let Some(p) = parent(&key) {
            self.ensure_dir(&p);
        }
        let is_new = !self.files.contains_key(&key);
        self.files.insert(key.clone(), MemFileData { bytes, mtime });
        if is_new && let Some(p) = parent(&key) {
            self.bump(&p);
        }
    }

    /// Direct children of a directory, sorted by name.
    fn children(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = if dir == "/" {
            "/".to_owned()
        } else {
            format!("{dir}/")
        };
        let direct = |k: &str| -> Option<String> {
            let rest = k.strip_prefix(prefix.as_str())?;
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_owned())
        };

        let mut entries: Vec<DirEntry> = self
            .dirs
            .keys()
            .filter_map(|k| direct(k).map(|name| DirEntry::new(name, EntryKind::Dir)))
            .chain(
                self.files
                    .keys()
                    .filter_map(|k| direct(k).map(|name| DirEntry::new(name, EntryKind::File))),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

/// In-memory backend for testing.
///
/// Stores files and directories in memory behind an `RwLock`, so tests can
/// mutate the tree through a shared handle (`Arc<MemFs>`) while a cache
/// reads it. Parent directories come into existence implicitly; a
/// directory's mtime changes only when a direct child is created or
/// removed, and a directory's stat size is its direct child count.
///
/// Open handles snapshot the node at open time: later writes don't affect
/// content or stat already handed out.
///
/// # Example
///
/// ```ignore
/// use statcache_vfs::{MemFs, Vfs};
///
/// let fs = MemFs::new().with_file("/config.json", r#"{"name":"app"}"#);
/// let mut handle = fs.open("/config.json")?;
/// assert_eq!(fs.open_count(), 1);
/// ```
#[derive(Debug)]
pub struct MemFs {
    state: RwLock<MemState>,
    opens: AtomicUsize,
}

impl Default for MemFs {
    fn default() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(
            "/".to_owned(),
            UNIX_EPOCH + Duration::from_secs(CLOCK_BASE_SECS),
        );
        Self {
            state: RwLock::new(MemState {
                files: BTreeMap::new(),
                dirs,
                clock: 0,
            }),
            opens: AtomicUsize::new(0),
        }
    }
}

impl MemFs {
    /// Create an empty backend containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder form), creating parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.write(path, bytes);
        self
    }

    /// Add an empty directory (builder form), creating parents as needed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_dir(self, path: &str) -> Self {
        self.state.write().unwrap().ensure_dir(&key(path));
        self
    }

    /// Create or replace a file with a fresh mtime from the logical clock.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn write(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        let mut state = self.state.write().unwrap();
        let mtime = state.tick();
        state.write_at(key(path), bytes.into(), mtime);
    }

    /// Create or replace a file with a pinned mtime.
    ///
    /// Writing different bytes of the same length with the previous mtime
    /// reproduces the stat-invisible-change case exactly.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn write_with_mtime(&self, path: &str, bytes: impl Into<Vec<u8>>, mtime: SystemTime) {
        let mut state = self.state.write().unwrap();
        state.write_at(key(path), bytes.into(), mtime);
    }

    /// Overwrite the mtime of an existing file or directory.
    ///
    /// Does nothing if the path doesn't exist.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_mtime(&self, path: &str, mtime: SystemTime) {
        let key = key(path);
        let mut state = self.state.write().unwrap();
        if let Some(file) = state.files.get_mut(&key) {
            file.mtime = mtime;
        } else if let Some(dir) = state.dirs.get_mut(&key) {
            *dir = mtime;
        }
    }

    /// Remove a file, or a directory and everything beneath it. The parent
    /// directory's mtime is bumped if something was removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove(&self, path: &str) {
        let key = key(path);
        let mut state = self.state.write().unwrap();

        let removed_file = state.files.remove(&key).is_some();
        let removed_dir = state.dirs.remove(&key).is_some();
        if removed_dir {
            let prefix = format!("{key}/");
            state.files.retain(|k, _| !k.starts_with(&prefix));
            state.dirs.retain(|k, _| !k.starts_with(&prefix));
        }

        if (removed_file || removed_dir)
            && let Some(p) = parent(&key)
        {
            state.bump(&p);
        }
    }

    /// Current mtime of a file or directory, without counting as an open.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn mtime(&self, path: &str) -> Option<SystemTime> {
        let key = key(path);
        let state = self.state.read().unwrap();
        state
            .files
            .get(&key)
            .map(|f| f.mtime)
            .or_else(|| state.dirs.get(&key).copied())
    }

    /// Number of `open` calls made so far, successful or not.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl Vfs for MemFs {
    fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        let key = key(path);
        let state = self.state.read().unwrap();

        if let Some(mtime) = state.dirs.get(&key) {
            let listing = state.children(&key);
            return Ok(Box::new(MemHandle {
                stat: Stat {
                    size: listing.len() as u64,
                    mtime: *mtime,
                },
                content: Cursor::new(Vec::new()),
                listing: Some(listing),
            }));
        }

        if let Some(file) = state.files.get(&key) {
            return Ok(Box::new(MemHandle {
                stat: Stat {
                    size: file.bytes.len() as u64,
                    mtime: file.mtime,
                },
                content: Cursor::new(file.bytes.clone()),
                listing: None,
            }));
        }

        Err(VfsError::not_found(key).with_backend(BACKEND))
    }
}

/// Snapshot handle over an in-memory node.
#[derive(Debug)]
struct MemHandle {
    stat: Stat,
    content: Cursor<Vec<u8>>,
    listing: Option<Vec<DirEntry>>,
}

impl Read for MemHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.listing.is_some() {
            return Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory"));
        }
        self.content.read(buf)
    }
}

impl VfsFile for MemHandle {
    fn stat(&self) -> Result<Stat, VfsError> {
        Ok(self.stat)
    }

    fn read_dir(&mut self) -> Result<Vec<DirEntry>, VfsError> {
        self.listing
            .clone()
            .ok_or_else(|| VfsError::new(VfsErrorKind::NotADirectory).with_backend(BACKEND))
    }
}
