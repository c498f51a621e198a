//! Helpers for slash-separated provider paths.
//!
//! These never perform `.`/`..` elimination; that is the navigator's job.

/// Collapse separators and make the path absolute.
///
/// Backslashes are treated as separators. A trailing separator is dropped
/// unless the whole path is `/`.
pub fn normalize_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split(['/', '\\']).filter(|s| !s.is_empty()) {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Join a child name onto a parent path without doubling the separator.
pub fn join(parent: &str, name: &str) -> String {
    let mut out = String::with_capacity(parent.len() + name.len() + 1);
    out.push_str(parent);
    if !parent.ends_with('/') {
        out.push('/');
    }
    out.push_str(name);
    out
}

/// Structural parent of `path`, `None` for `/` and for relative names.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

pub fn file_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Every ancestor directory of `path`, nearest first, ending with `/`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_path(path), |p| parent_path(p))
}

/// True when `ancestor` is a strict ancestor directory of `path`.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Lower-case a path for case-insensitive comparison.
pub fn fold_case(path: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        path.to_string()
    } else {
        path.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_roots() {
        assert_eq!(normalize_separators("a//b\\c/"), "/a/b/c");
        assert_eq!(normalize_separators(""), "/");
        assert_eq!(normalize_separators("/x/./../y"), "/x/./../y");
    }

    #[test]
    fn join_does_not_double_separator() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/lib.arc!/", "META"), "/lib.arc!/META");
    }

    #[test]
    fn ancestors_walk_up_to_root() {
        let all: Vec<&str> = ancestors("/a/b/c/y.arc").collect();
        assert_eq!(all, vec!["/a/b/c", "/a/b", "/a", "/"]);
        assert_eq!(ancestors("/").count(), 0);
    }

    #[test]
    fn ancestry_respects_segment_boundaries() {
        assert!(is_ancestor("/a/b", "/a/b/c"));
        assert!(!is_ancestor("/a/b", "/a/bc"));
        assert!(!is_ancestor("/a/b", "/a/b"));
        assert!(is_ancestor("/", "/a"));
        assert_eq!(file_name("/a/b.txt"), "b.txt");
    }
}
