//! Vfs trait and error types.
//!
//! Provides the core [`Vfs`] trait for abstracting filesystem access behind
//! open/stat/list operations, along with [`VfsError`] for unified error
//! handling across backends.
//!
//! # Virtual Path Convention
//!
//! All path parameters in Vfs methods are **virtual paths**, not host paths:
//! rooted at `/`, `/`-separated on every platform, already normalized by the
//! caller (no `.` or `..` components, no repeated or trailing separators).
//! - `"/"` - the backend root
//! - `"/config.json"` - file directly under the root
//! - `"/profiles/alice.json"` - nested file
//!
//! Backends handle the mapping from virtual paths to their internal layout.

use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

/// Metadata snapshot of an open filesystem object.
///
/// Both fields compare with exact equality; callers decide what a mismatch
/// means. There is no tolerance window: a one-nanosecond mtime difference is
/// a difference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
    /// Size in bytes. For directories the value is backend-defined; callers
    /// should treat it as an opaque change detector alongside `mtime`.
    pub size: u64,
    /// Last modification time.
    pub mtime: SystemTime,
}

/// Kind of a directory child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link (not followed).
    Symlink,
    /// Anything else (sockets, devices, ...).
    Other,
}

/// One direct child of a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Bare name, no separators (e.g., `"config.json"`).
    pub name: String,
    /// What the child is.
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create a directory entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum VfsErrorKind {
    /// Object does not exist.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// A directory operation was attempted on a non-directory.
    NotADirectory,
    /// A file operation was attempted on a directory.
    IsADirectory,
    /// Invalid path.
    InvalidPath,
    /// Other/unknown error category.
    Other,
}

/// Vfs error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct VfsError {
    /// Semantic error category.
    pub kind: VfsErrorKind,
    /// Path context (if applicable). Backends may attach either the virtual
    /// path or the resolved host path, whichever is more useful to log.
    pub path: Option<PathBuf>,
    /// Backend identifier (e.g., "Os", "Mem").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl VfsError {
    /// Create a new vfs error.
    #[must_use]
    pub fn new(kind: VfsErrorKind) -> Self {
        Self {
            kind,
            path: None,
            backend: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error with path.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(VfsErrorKind::NotFound).with_path(path)
    }

    /// Create a vfs error from an I/O error.
    #[must_use]
    pub fn io(err: io::Error, path: Option<PathBuf>) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => VfsErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => VfsErrorKind::PermissionDenied,
            io::ErrorKind::NotADirectory => VfsErrorKind::NotADirectory,
            io::ErrorKind::IsADirectory => VfsErrorKind::IsADirectory,
            _ => VfsErrorKind::Other,
        };
        let mut error = Self::new(kind).with_source(err);
        if let Some(p) = path {
            error = error.with_path(p);
        }
        error
    }
}

impl std::fmt::Display for VfsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (path: /foo/bar)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            VfsErrorKind::NotFound => "Not found",
            VfsErrorKind::PermissionDenied => "Permission denied",
            VfsErrorKind::NotADirectory => "Not a directory",
            VfsErrorKind::IsADirectory => "Is a directory",
            VfsErrorKind::InvalidPath => "Invalid path",
            VfsErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }

        Ok(())
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Filesystem abstraction for cache lookups.
///
/// A single `open` entry point covers files and directories alike; what was
/// opened determines which [`VfsFile`] operations succeed. Implementations
/// must tolerate concurrent calls.
///
/// # Virtual Paths
///
/// All path parameters are **virtual paths** (see module docs): rooted,
/// `/`-separated, pre-normalized. `"/"` opens the backend root.
pub trait Vfs: Send + Sync {
    /// Open the filesystem object at a virtual path.
    ///
    /// The returned handle is released when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError`] if the object doesn't exist or can't be opened.
    fn open(&self, path: &str) -> Result<Box<dyn VfsFile>, VfsError>;
}

/// An open filesystem object: file content, metadata, or directory listing.
///
/// Handles observe the object as it was at open time where the backend can
/// guarantee it (the in-memory backend snapshots; the host backend holds the
/// file open). Dropping the handle releases it.
pub trait VfsFile: io::Read + Send {
    /// Metadata of the open object.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError`] if metadata can't be retrieved.
    fn stat(&self) -> Result<Stat, VfsError>;

    /// Direct children of the open directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError`] with kind
    /// [`NotADirectory`](VfsErrorKind::NotADirectory) if the handle is not a
    /// directory, or if the listing fails.
    fn read_dir(&mut self) -> Result<Vec<DirEntry>, VfsError>;
}
