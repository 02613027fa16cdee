//! JSON file parsing on top of [`Parser`].

use std::io::BufReader;

use serde::de::DeserializeOwned;
use statcache_vfs::VfsFile;

use crate::parse::{ParseError, Parser};

/// A parser that deserializes the whole file as JSON into `T`.
///
/// Trailing non-whitespace after the JSON value is rejected, so a
/// truncated or concatenated file never half-parses.
///
/// ```ignore
/// let cache = FsCache::new(fs, json_parser::<Config>(), Duration::from_secs(2));
/// ```
pub fn json_parser<T: DeserializeOwned>() -> impl Parser<T> {
    |file: &mut dyn VfsFile| -> Result<T, ParseError> {
        serde_json::from_reader(BufReader::new(file)).map_err(Into::into)
    }
}
