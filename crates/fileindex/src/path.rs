//! Path normalization helpers shared by the scanner, the query engine and the
//! HTTP layer.
//!
//! Every path that leaves the scanner is slash-normalized here, so nothing
//! downstream ever splits on the OS separator.

use std::path::Path;

/// Strips a single trailing slash.
pub fn strip_trailing_slash(raw: &str) -> &str {
    raw.strip_suffix('/').unwrap_or(raw)
}

/// Splits a path into its non-empty segments.
pub fn split_path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Computes the relative directory of `dir` below `root`, in the canonical
/// `/seg/seg/` form (always a leading and trailing slash, `/` for the root).
///
/// Returns `None` when `dir` is not inside `root`.
pub fn relative_dir(root: &Path, dir: &Path) -> Option<String> {
    let stripped = dir.strip_prefix(root).ok()?;
    let mut relative = String::from("/");
    for component in stripped.components() {
        let segment = component.as_os_str().to_string_lossy();
        if segment.is_empty() {
            continue;
        }
        relative.push_str(&segment);
        relative.push('/');
    }
    Some(relative)
}

/// Joins a canonical relative directory and a name into a cache key.
pub fn cache_key(relative_path: &str, name: &str) -> String {
    let mut key = String::with_capacity(relative_path.len() + name.len() + 1);
    key.push_str(relative_path);
    if !key.ends_with('/') {
        key.push('/');
    }
    key.push_str(name);
    key
}

/// Turns a request path tail (`a/x.txt`, `/a/x.txt`, `%2Fa%2Fx.txt`) into a
/// cache key (`/a/x.txt`). Only `/` separates segments; a backslash is part
/// of a name.
pub fn key_from_request_path(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let segments = split_path_segments(&decoded);
    format!("/{}", segments.join("/"))
}

/// Builds a resource handle such as `/detail/a/x.txt` for a cache key.
///
/// Each segment is percent-encoded; the separators stay readable.
pub fn resource_url(kind: &str, key: &str) -> String {
    let mut url = format!("/{kind}");
    for segment in key.split('/').filter(|segment| !segment.is_empty()) {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

/// Reduces an uploaded file name to ASCII letters, digits, `-` and `_`, with
/// no two dots in a row.
pub fn clean_filename(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_was_dot = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            last_was_dot = false;
            cleaned.push(ch);
        } else if ch == '.' && !last_was_dot {
            last_was_dot = true;
            cleaned.push(ch);
        }
    }
    cleaned
}
