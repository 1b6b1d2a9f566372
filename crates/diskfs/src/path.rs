// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Virtual path helpers.
//!
//! A virtual path looks like `/<disk>/<rest>`. Everything here works on
//! `/`-separated strings rather than `std::path`, since virtual paths never
//! touch host path syntax until a `RealDisk` maps them.

use crate::error::{Error, Result};
use diagnostics::log_error;

/// Resolve `path` against `current_dir` into a canonical absolute path.
///
/// `.` segments are dropped and `..` removes the preceding segment. A `..`
/// that would climb out of the disk segment is a caller bug and fails with
/// [`Error::InvalidPath`].
pub fn resolve_path(current_dir: &str, path: &str) -> Result<String> {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", current_dir.trim_end_matches('/'), path)
    };

    let mut stack: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if stack.len() <= 1 {
                    log_error!("path climbs above root: {path}", path: joined.as_str());
                    return Err(Error::InvalidPath);
                }
                _ = stack.pop();
            }
            name => stack.push(name),
        }
    }

    Ok(format!("/{}", stack.join("/")))
}

/// Split a canonical virtual path into its disk name and disk-local remainder.
///
/// Returns `None` for paths that are not absolute or name no disk.
#[must_use]
pub fn split_disk(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('/')?;
    let (disk, local) = match rest.split_once('/') {
        Some((disk, local)) => (disk, local),
        None => (rest, ""),
    };
    if disk.is_empty() {
        return None;
    }
    Some((disk, local))
}

/// Non-empty segments of a disk-local path
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".").collect()
}

/// True if any segment would step outside its parent
#[must_use]
pub fn has_parent_segment(path: &str) -> bool {
    path.split('/').any(|s| s == "..")
}

/// Final segment of a path, if any
#[must_use]
pub fn basename(path: &str) -> Option<&str> {
    segments(path).last().copied()
}

/// Everything before the final segment, without a trailing slash
#[must_use]
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Join a directory and a child name with exactly one separator
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
    }
}
