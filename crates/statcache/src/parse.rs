//! Parser seam for turning open files into typed values.

use statcache_vfs::VfsFile;

/// Error type parsers report.
///
/// Boxed so any decoder's native error passes through unchanged; the cache
/// never inspects it beyond `Display` and `source`.
pub type ParseError = Box<dyn std::error::Error + Send + Sync>;

/// Turns an open file handle into a typed value.
///
/// Implemented for free by any matching closure or function, so most callers
/// never name this trait:
///
/// ```ignore
/// let parser = |file: &mut dyn VfsFile| -> Result<usize, ParseError> {
///     let mut text = String::new();
///     file.read_to_string(&mut text)?;
///     Ok(text.len())
/// };
/// let cache = FsCache::new(fs, parser, Duration::from_secs(2));
/// ```
///
/// The handle arrives positioned at the start and stays owned by the
/// invoking cache, which releases it afterwards; parsers must not assume
/// anything beyond [`Read`](std::io::Read).
pub trait Parser<T>: Send + Sync {
    /// Parse the open handle into a value.
    ///
    /// # Errors
    ///
    /// Returns the decoder's native error, boxed.
    fn parse(&self, file: &mut dyn VfsFile) -> Result<T, ParseError>;
}

impl<T, F> Parser<T> for F
where
    F: Fn(&mut dyn VfsFile) -> Result<T, ParseError> + Send + Sync,
{
    fn parse(&self, file: &mut dyn VfsFile) -> Result<T, ParseError> {
        self(file)
    }
}
