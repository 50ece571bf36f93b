//! Path handling for archive filesystems.
//!
//! Archives store entry names relative to the archive root with no leading
//! `/`. Every path handed to a driver is brought into the same shape:
//! absolute paths lose their leading `/`, relative paths are joined to the
//! current directory, and `.` / `..` / empty segments are folded away. The
//! root directory is the empty string.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::FsError;

/// Path separator inside archives.
pub const SEPARATOR: char = '/';

/// Normalize a path into archive form (`"a/b"`, root is `""`).
///
/// `..` above the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(SEPARATOR) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    parts.join("/")
}

/// Resolve `path` against the current directory `cwd` (archive form).
pub fn resolve(cwd: &str, path: &str, max_len: usize) -> Result<String, FsError> {
    let resolved = if path.starts_with(SEPARATOR) || cwd.is_empty() {
        normalize(path)
    } else {
        let mut joined = String::with_capacity(cwd.len() + 1 + path.len());
        joined.push_str(cwd);
        joined.push(SEPARATOR);
        joined.push_str(path);
        normalize(&joined)
    };
    if resolved.len() > max_len {
        return Err(FsError::NameTooLong);
    }
    Ok(resolved)
}

/// Clean an entry name read from an archive header.
///
/// Strips a leading `./` or `/` and any trailing `/`, so `"./lib/"` and
/// `"lib"` name the same entry.
pub fn entry_name(raw: &str) -> &str {
    let mut name = raw;
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix(SEPARATOR) {
            name = rest;
        } else {
            break;
        }
    }
    name.trim_end_matches(SEPARATOR)
}

/// Prefix every descendant of directory `path` starts with.
pub fn dir_prefix(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut prefix = String::with_capacity(path.len() + 1);
    prefix.push_str(path);
    prefix.push(SEPARATOR);
    prefix
}

/// How an entry name relates to a looked-up path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameMatch {
    /// Same name
    Exact,
    /// Entry lives below the path, so the path is a directory
    Descendant,
    /// Unrelated
    Mismatch,
}

/// Compare a cleaned entry name against a normalized lookup path.
pub fn match_name(name: &str, path: &str) -> NameMatch {
    if path.is_empty() {
        return NameMatch::Descendant;
    }
    if name == path {
        return NameMatch::Exact;
    }
    match name.strip_prefix(path) {
        Some(rest) if rest.starts_with(SEPARATOR) => NameMatch::Descendant,
        _ => NameMatch::Mismatch,
    }
}

/// First segment of `rest` and whether anything follows it.
///
/// `"b"` is a direct child, `"b/c"` puts `b` on the path to a nested entry.
pub fn first_segment(rest: &str) -> (&str, bool) {
    match rest.find(SEPARATOR) {
        Some(idx) => (&rest[..idx], idx + 1 < rest.len()),
        None => (rest, false),
    }
}

/// Render an archive-form path as an absolute path.
pub fn absolute(path: &str) -> String {
    let mut abs = String::with_capacity(path.len() + 1);
    abs.push(SEPARATOR);
    abs.push_str(path);
    abs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("/lib/foo.py"), "lib/foo.py");
        assert_eq!(normalize("lib//./foo/"), "lib/foo");
        assert_eq!(normalize("/lib/../main.py"), "main.py");
        assert_eq!(normalize("/../.."), "");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        assert_eq!(resolve("lib", "sub", 64).unwrap(), "lib/sub");
        assert_eq!(resolve("lib", "./sub", 64).unwrap(), "lib/sub");
        assert_eq!(resolve("lib", "..", 64).unwrap(), "");
        assert_eq!(resolve("lib", "/etc", 64).unwrap(), "etc");
        assert_eq!(resolve("", "main.py", 64).unwrap(), "main.py");
    }

    #[test]
    fn test_resolve_too_long() {
        assert_eq!(resolve("", "abcdef", 4), Err(FsError::NameTooLong));
    }

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name("./lib/"), "lib");
        assert_eq!(entry_name("/lib/a.py"), "lib/a.py");
        assert_eq!(entry_name("main.py"), "main.py");
        assert_eq!(entry_name("./"), "");
    }

    #[test]
    fn test_match_name() {
        assert_eq!(match_name("a/b.txt", "a"), NameMatch::Descendant);
        assert_eq!(match_name("a", "a"), NameMatch::Exact);
        assert_eq!(match_name("ab", "a"), NameMatch::Mismatch);
        assert_eq!(match_name("b/a", "a"), NameMatch::Mismatch);
        assert_eq!(match_name("anything", ""), NameMatch::Descendant);
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("b"), ("b", false));
        assert_eq!(first_segment("b/"), ("b", false));
        assert_eq!(first_segment("b/c.txt"), ("b", true));
    }
}
