//! Path helpers
//!
//! Pure string manipulation; nothing here touches a filesystem.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Result, VfsError};

/// Path separator
pub const SEPARATOR: char = '/';

/// True for paths anchored at the global root
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Non-empty components of `path`, in order
///
/// `.` and `..` are returned as-is; the resolver decides what they mean.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|c| !c.is_empty())
}

/// Split `path` into (parent path, leaf name)
///
/// Trailing separators are ignored. A bare name splits into `(".", name)`.
///
/// # Errors
/// `InvalidPath` when there is no usable leaf (`""`, `"/"`, `"."`, `".."`).
pub fn split_parent(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Err(VfsError::invalid_path(path));
    }

    let (parent, leaf) = match trimmed.rfind(SEPARATOR) {
        None => (".", trimmed),
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
    };

    if leaf == "." || leaf == ".." {
        return Err(VfsError::invalid_path(path));
    }
    Ok((parent, leaf))
}

/// Join `path` onto `base` (returns `path` unchanged when it is absolute)
pub fn join(base: &str, path: &str) -> String {
    if is_absolute(path) {
        return String::from(path);
    }
    let mut joined = String::from(base);
    if !joined.ends_with(SEPARATOR) {
        joined.push(SEPARATOR);
    }
    joined.push_str(path);
    joined
}

/// Lexically normalize an absolute path: collapse separators, apply `.`/`..`
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for component in components(path) {
        match component {
            "." => {}
            ".." => {
                stack.pop();
            }
            name => stack.push(name),
        }
    }

    if stack.is_empty() {
        return String::from("/");
    }
    let mut out = String::new();
    for name in stack {
        out.push(SEPARATOR);
        out.push_str(name);
    }
    out
}
