//! Cache error types.
//!
//! Failures surface verbatim: the cache adds the stale-value context via
//! [`StaleError`] but never rewraps or reclassifies what the filesystem or
//! the parser reported.

use statcache_vfs::{VfsError, VfsErrorKind};

use crate::parse::ParseError;

/// Why a fetch failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem failure: open, stat, or directory read.
    #[error(transparent)]
    Fs(#[from] VfsError),
    /// The parser rejected the file content.
    #[error("{0}")]
    Parse(#[source] ParseError),
}

impl Error {
    /// True if the underlying failure is a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fs(e) if e.kind == VfsErrorKind::NotFound)
    }

    /// The filesystem error, if that is what this is.
    #[must_use]
    pub fn as_fs(&self) -> Option<&VfsError> {
        match self {
            Self::Fs(e) => Some(e),
            Self::Parse(_) => None,
        }
    }
}

/// A failed fetch, carrying the last known-good value when one exists.
///
/// `error` is the verbatim failure; `stale` is what the cache returned
/// before the failed refresh, or `None` if the path never loaded
/// successfully. Callers decide whether serving the stale value beats
/// failing.
#[derive(Debug)]
pub struct StaleError<V> {
    /// Last successfully loaded value, if any.
    pub stale: Option<V>,
    /// What went wrong.
    pub error: Error,
}

impl<V> StaleError<V> {
    /// The stale value, if any.
    #[must_use]
    pub fn stale(&self) -> Option<&V> {
        self.stale.as_ref()
    }

    /// Consume the error, keeping only the stale value.
    #[must_use]
    pub fn into_stale(self) -> Option<V> {
        self.stale
    }

    /// True if the underlying failure is a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error.is_not_found()
    }
}

impl<V> std::fmt::Display for StaleError<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Verbatim; staleness is context, not part of the failure.
        write!(f, "{}", self.error)
    }
}

impl<V: std::fmt::Debug> std::error::Error for StaleError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
