// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Recursive in-memory directory tree.
//!
//! Backs every `MemoryDisk` and doubles as the payload of a full-tree sync.
//! A name is unique across a directory's files *and* subdirectories.

use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File content plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFile {
    pub metadata: FileMetadata,
    pub data: Vec<u8>,
}

impl MemoryFile {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            metadata: FileMetadata::file(data.len() as u64),
            data,
        }
    }
}

/// One directory node and everything below it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryDirectoryTree {
    pub metadata: FileMetadata,
    #[serde(default)]
    pub subdirs: BTreeMap<String, MemoryDirectoryTree>,
    #[serde(default)]
    pub files: BTreeMap<String, MemoryFile>,
}

impl MemoryDirectoryTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is an immediate child, file or directory
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name) || self.subdirs.contains_key(name)
    }

    /// Number of immediate children
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.files.len() + self.subdirs.len()
    }

    fn touch(&mut self) {
        self.metadata = FileMetadata {
            comment: std::mem::take(&mut self.metadata.comment),
            ..FileMetadata::directory(self.entry_count() as u64)
        };
    }

    /// Descend through `segments`, all of which must be directories
    #[must_use]
    pub fn dir(&self, segments: &[&str]) -> Option<&MemoryDirectoryTree> {
        match segments.split_first() {
            None => Some(self),
            Some((first, rest)) => self.subdirs.get(*first)?.dir(rest),
        }
    }

    fn dir_mut(&mut self, segments: &[&str]) -> Option<&mut MemoryDirectoryTree> {
        match segments.split_first() {
            None => Some(self),
            Some((first, rest)) => self.subdirs.get_mut(*first)?.dir_mut(rest),
        }
    }

    /// Names directly under the directory at `segments`: files first, then
    /// subdirectories, each group sorted.
    #[must_use]
    pub fn list(&self, segments: &[&str]) -> Option<Vec<String>> {
        let dir = self.dir(segments)?;
        Some(
            dir.files
                .keys()
                .chain(dir.subdirs.keys())
                .cloned()
                .collect(),
        )
    }

    #[must_use]
    pub fn read(&self, segments: &[&str]) -> Option<&MemoryFile> {
        let (name, parent) = segments.split_last()?;
        self.dir(parent)?.files.get(*name)
    }

    #[must_use]
    pub fn stat(&self, segments: &[&str]) -> Option<FileMetadata> {
        let Some((name, parent)) = segments.split_last() else {
            return Some(self.metadata.clone());
        };
        let dir = self.dir(parent)?;
        dir.files
            .get(*name)
            .map(|f| f.metadata.clone())
            .or_else(|| dir.subdirs.get(*name).map(|d| d.metadata.clone()))
    }

    #[must_use]
    pub fn exists(&self, segments: &[&str]) -> bool {
        self.stat(segments).is_some()
    }

    /// Create or overwrite the file named by the last segment.
    ///
    /// Intermediate directories are never created: if one is missing, or
    /// the target name is a directory, nothing changes and `false` is
    /// returned.
    pub fn write(&mut self, segments: &[&str], data: &[u8]) -> bool {
        let Some((name, parent)) = segments.split_last() else {
            return false;
        };
        let Some(dir) = self.dir_mut(parent) else {
            return false;
        };
        if dir.subdirs.contains_key(*name) {
            return false;
        }
        let comment = dir
            .files
            .get(*name)
            .map(|f| f.metadata.comment.clone())
            .unwrap_or_default();
        let mut file = MemoryFile::new(data.to_vec());
        file.metadata.comment = comment;
        _ = dir.files.insert((*name).to_string(), file);
        dir.touch();
        true
    }

    pub fn make_dir(&mut self, segments: &[&str]) -> Result<()> {
        let (name, parent) = segments.split_last().ok_or(Error::InvalidPath)?;
        let dir = self.dir_mut(parent).ok_or(Error::FileNotFound)?;
        if dir.contains(name) {
            return Err(Error::AlreadyExists);
        }
        _ = dir
            .subdirs
            .insert((*name).to_string(), MemoryDirectoryTree::new());
        dir.touch();
        Ok(())
    }

    pub fn delete(&mut self, segments: &[&str]) -> Result<()> {
        let (name, parent) = segments.split_last().ok_or(Error::InvalidPath)?;
        let dir = self.dir_mut(parent).ok_or(Error::FileNotFound)?;
        if dir.files.remove(*name).is_none() {
            let empty = match dir.subdirs.get(*name) {
                None => return Err(Error::FileNotFound),
                Some(sub) => sub.entry_count() == 0,
            };
            if !empty {
                return Err(Error::DirectoryNotEmpty);
            }
            _ = dir.subdirs.remove(*name);
        }
        dir.touch();
        Ok(())
    }

    /// Attach a comment to an existing entry
    pub fn set_comment(&mut self, segments: &[&str], comment: &str) -> Result<()> {
        let Some((name, parent)) = segments.split_last() else {
            self.metadata.comment = comment.to_string();
            return Ok(());
        };
        let dir = self.dir_mut(parent).ok_or(Error::FileNotFound)?;
        if let Some(file) = dir.files.get_mut(*name) {
            file.metadata.comment = comment.to_string();
        } else if let Some(sub) = dir.subdirs.get_mut(*name) {
            sub.metadata.comment = comment.to_string();
        } else {
            return Err(Error::FileNotFound);
        }
        Ok(())
    }

    /// Total bytes of file content below this node
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.data.len() as u64).sum::<u64>()
            + self.subdirs.values().map(Self::total_size).sum::<u64>()
    }

    /// Structural equality ignoring timestamps
    #[must_use]
    pub fn content_eq(&self, other: &MemoryDirectoryTree) -> bool {
        self.files.len() == other.files.len()
            && self.subdirs.len() == other.subdirs.len()
            && self.files.iter().all(|(name, f)| {
                other
                    .files
                    .get(name)
                    .is_some_and(|g| g.data == f.data && g.metadata.same_shape(&f.metadata))
            })
            && self.subdirs.iter().all(|(name, d)| {
                other.subdirs.get(name).is_some_and(|e| d.content_eq(e))
            })
    }

    /// Recursively copy a host directory into a fresh tree
    pub fn snapshot(host_dir: &Path) -> std::io::Result<MemoryDirectoryTree> {
        let mut tree = MemoryDirectoryTree::new();
        for entry in std::fs::read_dir(host_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                let mut sub = Self::snapshot(&entry.path())?;
                sub.metadata.modified_at = FileMetadata::from_host(&meta).modified_at;
                _ = tree.subdirs.insert(name, sub);
            } else if meta.is_file() {
                let data = std::fs::read(entry.path())?;
                let mut file = MemoryFile::new(data);
                file.metadata.modified_at = FileMetadata::from_host(&meta).modified_at;
                _ = tree.files.insert(name, file);
            }
        }
        tree.touch();
        Ok(tree)
    }
}
