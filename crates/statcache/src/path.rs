//! Virtual path normalization.

/// Normalize a caller-supplied path into key form.
///
/// Keys are rooted at `/`, use `/` separators, and contain no `.` or `..`
/// components and no repeated or trailing separators. `..` resolves
/// lexically and clamps at the root, so no input escapes it. Every cache
/// operation normalizes first, which is why `"config.json"`,
/// `"/config.json"` and `"./config.json"` share one entry.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        "/".to_owned()
    } else {
        format!("/{}", parts.join("/"))
    }
}
