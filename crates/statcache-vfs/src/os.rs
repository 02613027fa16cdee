//! Host filesystem backend.
//!
//! Provides [`OsFs`] for serving virtual paths from a directory on the local
//! filesystem.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::vfs::{DirEntry, EntryKind, Stat, Vfs, VfsError, VfsErrorKind, VfsFile};

/// Backend identifier for error messages.
const BACKEND: &str = "Os";

/// Host filesystem backend rooted at a directory.
///
/// Virtual paths resolve under the root: `"/config.json"` maps to
/// `<root>/config.json` and `"/"` maps to the root itself. Paths containing
/// parent directory components (`..`) are rejected with
/// [`InvalidPath`](crate::VfsErrorKind::InvalidPath), so lookups cannot
/// escape the root. The root is not required to exist at construction time;
/// a missing root surfaces as [`NotFound`](crate::VfsErrorKind::NotFound)
/// on `open`.
///
/// # Example
///
/// ```ignore
/// use statcache_vfs::{OsFs, Vfs};
///
/// let fs = OsFs::new("/var/lib/app/data");
/// let mut handle = fs.open("/config.json")?;
/// let stat = handle.stat()?;
/// ```
#[derive(Debug, Clone)]
pub struct OsFs {
    /// Host directory all virtual paths resolve under.
    root: PathBuf,
}

impl OsFs {
    /// Create a backend rooted at a host directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host directory this backend serves.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to its host path.
    ///
    /// Rejects paths containing parent directory components (`..`), so a
    /// crafted path such as `/../etc/passwd` cannot reach outside the root.
    /// Stripping the leading separator keeps `join` from treating the path
    /// as an absolute host path.
    fn resolve(&self, path: &str) -> Result<PathBuf, VfsError> {
        let relative = path.trim_start_matches('/');
        if relative.split('/').any(|component| component == "..") {
            return Err(VfsError::new(VfsErrorKind::InvalidPath)
                .with_path(path)
                .with_backend(BACKEND));
        }
        Ok(self.root.join(relative))
    }
}

impl Vfs for OsFs {
    fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError> {
        let host_path = self.resolve(path)?;
        let file = File::open(&host_path)
            .map_err(|e| VfsError::io(e, Some(host_path.clone())).with_backend(BACKEND))?;
        Ok(Box::new(OsFile { file, host_path }))
    }
}

/// Open handle on a host filesystem object.
///
/// Keeps the `File` open for the handle's lifetime, so `stat` observes the
/// object that was opened even if the path was replaced since. Directory
/// listings go through the remembered host path because directory content
/// can't be read from the descriptor portably.
struct OsFile {
    file: File,
    host_path: PathBuf,
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl VfsFile for OsFile {
    fn stat(&self) -> Result<Stat, VfsError> {
        let meta = self
            .file
            .metadata()
            .map_err(|e| VfsError::io(e, Some(self.host_path.clone())).with_backend(BACKEND))?;
        let mtime = meta
            .modified()
            .map_err(|e| VfsError::io(e, Some(self.host_path.clone())).with_backend(BACKEND))?;

        Ok(Stat {
            size: meta.len(),
            mtime,
        })
    }

    fn read_dir(&mut self) -> Result<Vec<DirEntry>, VfsError> {
        let entries = fs::read_dir(&self.host_path)
            .map_err(|e| VfsError::io(e, Some(self.host_path.clone())).with_backend(BACKEND))?;

        let mut listing: Vec<DirEntry> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let Ok(file_type) = entry.file_type() else {
                    tracing::debug!(
                        path = %entry.path().display(),
                        "skipping directory entry with unreadable file type"
                    );
                    return None;
                };

                let kind = if file_type.is_dir() {
                    EntryKind::Dir
                } else if file_type.is_file() {
                    EntryKind::File
                } else if file_type.is_symlink() {
                    EntryKind::Symlink
                } else {
                    EntryKind::Other
                };

                Some(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    kind,
                })
            })
            .collect();

        listing.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(listing)
    }
}
