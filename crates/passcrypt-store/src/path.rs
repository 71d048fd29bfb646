//! Logical path handling.
//!
//! Paths are slash separated and rooted at the store. The root is the empty
//! string; no normalized path starts or ends with `/`.

/// Suffix carried by encrypted files.
pub const FILE_SUFFIX: &str = ".gpg";

/// Normalize a logical path.
///
/// Resolves `.` and `..`, collapses repeated slashes and strips the leading
/// slash. `..` never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Join a directory and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(dir, _)| dir))
}

/// Last segment of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Name shown to users: the file name without the `.gpg` suffix.
pub fn display_name(path: &str) -> &str {
    let name = file_name(path);
    name.strip_suffix(FILE_SUFFIX).unwrap_or(name)
}

/// Whether `path` equals `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Ancestors of `path` from itself up to the root, inclusive.
pub fn ancestors_or_self(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| parent(*p))
}

/// Whether a listing should hide this entry.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
