//! Path helpers for the mounted tree.
//!
//! Every path handled by the caches is absolute, `/`-separated and has no
//! trailing separator (except the root itself). Drivers that hand us
//! backslash-separated names are normalized on the way in.
//!
//! Prefix checks are segment aware: `/foobar` is *not* below `/foo`.

/// The root path of the mount.
pub const ROOT: &str = "/";

/// Separator between a file name and an alternate stream name.
const STREAM_SEPARATOR: char = ':';

/// Normalize a driver-supplied path.
///
/// Converts `\` to `/`, collapses repeated separators, ensures a leading
/// `/` and strips any trailing `/`.
///
/// ```
/// use cloudmount_cache::path::normalize;
///
/// assert_eq!(normalize(r"\docs\\notes.txt"), "/docs/notes.txt");
/// assert_eq!(normalize("docs/"), "/docs");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Returns the parent directory of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path` (empty for the root).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Join a directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns true if `candidate` equals `ancestor` or lies below it.
///
/// Matching is done on whole segments so that unrelated siblings sharing a
/// textual prefix are never matched.
pub fn is_same_or_descendant(candidate: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return candidate.starts_with('/');
    }
    match candidate.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Split `file:stream` into the file path and the alternate stream name.
///
/// Only the final segment is inspected, so colons in parent directory
/// names are left alone.
pub fn split_stream(path: &str) -> (&str, Option<&str>) {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].find(STREAM_SEPARATOR) {
        Some(idx) => {
            let split = name_start + idx;
            let stream = &path[split + 1..];
            // `file::$DATA` is the default stream
            let stream = stream.split(STREAM_SEPARATOR).next().unwrap_or_default();
            let stream = if stream.is_empty() { None } else { Some(stream) };
            (&path[..split], stream)
        }
        None => (path, None),
    }
}
