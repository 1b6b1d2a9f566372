// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::Disk;
use crate::change::{ReplicaLink, UpdateAction};
use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use crate::path::segments;
use crate::tree::MemoryDirectoryTree;
use diagnostics::log_debug;
use std::cell::RefCell;

/// Disk whose content lives in a [`MemoryDirectoryTree`].
///
/// A fresh replicated disk has no tree until the first full sync arrives;
/// until then reads find nothing and writes are dropped.
#[derive(Debug)]
pub struct MemoryDisk {
    name: String,
    writeable: bool,
    tree: RefCell<Option<MemoryDirectoryTree>>,
    link: Option<ReplicaLink>,
}

impl MemoryDisk {
    /// Unhydrated, unreplicated disk
    pub fn new(name: impl Into<String>, writeable: bool) -> Self {
        Self {
            name: name.into(),
            writeable,
            tree: RefCell::new(None),
            link: None,
        }
    }

    /// Unhydrated disk that publishes its mutations through `link`
    #[must_use]
    pub fn replicated(link: ReplicaLink) -> Self {
        Self {
            name: link.disk_name().to_string(),
            writeable: true,
            tree: RefCell::new(None),
            link: Some(link),
        }
    }

    /// Disk that starts out with `tree` already installed
    pub fn with_tree(name: impl Into<String>, tree: MemoryDirectoryTree, writeable: bool) -> Self {
        let disk = Self::new(name, writeable);
        disk.install_tree(tree);
        disk
    }

    /// Replace the whole content, e.g. from a full sync
    pub fn install_tree(&self, tree: MemoryDirectoryTree) {
        log_debug!(
            "installing tree on {disk} ({bytes} bytes)",
            disk: self.name.as_str(),
            bytes: tree.total_size()
        );
        *self.tree.borrow_mut() = Some(tree);
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.tree.borrow().is_some()
    }

    /// Copy of the current tree
    #[must_use]
    pub fn snapshot(&self) -> Option<MemoryDirectoryTree> {
        self.tree.borrow().clone()
    }

    #[must_use]
    pub fn link(&self) -> Option<&ReplicaLink> {
        self.link.as_ref()
    }

    pub fn set_comment(&self, path: &str, comment: &str) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let tree = tree.as_mut().ok_or(Error::FileNotFound)?;
        tree.set_comment(&segments(path), comment)
    }

    fn perform(&self, path: &str, action: &UpdateAction, publish: bool) -> Result<()> {
        if !self.writeable {
            return Err(Error::NotWriteable);
        }
        let segs = segments(path);
        let changed = {
            let mut tree = self.tree.borrow_mut();
            match (tree.as_mut(), action) {
                (None, UpdateAction::Write(_)) => {
                    log_debug!("dropping write to unsynced disk {disk}", disk: self.name.as_str());
                    false
                }
                (None, _) => return Err(Error::FileNotFound),
                (Some(tree), UpdateAction::Write(data)) => tree.write(&segs, data),
                (Some(tree), UpdateAction::MakeDir) => {
                    tree.make_dir(&segs)?;
                    true
                }
                (Some(tree), UpdateAction::Delete) => {
                    tree.delete(&segs)?;
                    true
                }
            }
        };
        if changed
            && publish
            && let Some(link) = &self.link
        {
            link.emit(path, action.clone());
        }
        Ok(())
    }
}

impl Disk for MemoryDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, path: &str) -> Option<Vec<String>> {
        self.tree.borrow().as_ref()?.list(&segments(path))
    }

    fn stat(&self, path: &str) -> Option<FileMetadata> {
        self.tree.borrow().as_ref()?.stat(&segments(path))
    }

    fn read_binary(&self, path: &str) -> Option<Vec<u8>> {
        let tree = self.tree.borrow();
        tree.as_ref()?.read(&segments(path)).map(|f| f.data.clone())
    }

    fn write_binary(&self, path: &str, data: &[u8]) -> Result<()> {
        self.perform(path, &UpdateAction::Write(data.to_vec()), true)
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        self.perform(path, &UpdateAction::MakeDir, true)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.perform(path, &UpdateAction::Delete, true)
    }

    fn is_writeable(&self) -> bool {
        self.writeable
    }

    fn apply_update(&self, path: &str, action: &UpdateAction) -> Result<()> {
        self.perform(path, action, false)
    }

    fn as_memory_disk(&self) -> Option<&MemoryDisk> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeLog, Visibility};
    use std::rc::Rc;

    fn replicated() -> (Rc<ChangeLog>, MemoryDisk) {
        let log = Rc::new(ChangeLog::new());
        let link = ReplicaLink::new("usr", Visibility::Private, log.clone());
        (log, MemoryDisk::replicated(link))
    }

    #[test]
    fn test_unhydrated_disk_is_empty() {
        let (log, disk) = replicated();
        assert!(!disk.is_hydrated());
        assert!(disk.list("").is_none());
        assert!(!disk.exists("startup.ms"));
        assert_eq!(disk.write_text("a.txt", "hi"), Ok(()));
        assert!(disk.read_text("a.txt").is_none());
        assert_eq!(disk.make_dir("d"), Err(Error::FileNotFound));
        assert!(log.is_empty());
    }

    #[test]
    fn test_mutations_publish() {
        let (log, disk) = replicated();
        disk.install_tree(MemoryDirectoryTree::new());
        disk.make_dir("lib").unwrap();
        disk.write_text("lib/a.ms", "x = 1").unwrap();
        disk.delete("lib/a.ms").unwrap();

        let changes = log.take();
        let actions: Vec<_> = changes.iter().map(|c| (c.path.as_str(), &c.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("lib", &UpdateAction::MakeDir),
                ("lib/a.ms", &UpdateAction::Write(b"x = 1".to_vec())),
                ("lib/a.ms", &UpdateAction::Delete),
            ]
        );
        assert!(changes.iter().all(|c| c.disk_name == "usr"));
    }

    #[test]
    fn test_silent_write_does_not_publish() {
        let (log, disk) = replicated();
        disk.install_tree(MemoryDirectoryTree::new());
        disk.write_text("missing/a.txt", "x").unwrap();
        assert!(log.is_empty());
        assert!(!disk.exists("missing/a.txt"));
    }

    #[test]
    fn test_apply_update_is_not_echoed() {
        let (log, disk) = replicated();
        disk.install_tree(MemoryDirectoryTree::new());
        disk.apply_update("a.txt", &UpdateAction::Write(b"remote".to_vec()))
            .unwrap();
        assert_eq!(disk.read_text("a.txt").as_deref(), Some("remote"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_read_only_memory_disk() {
        let disk = MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), false);
        assert_eq!(disk.write_text("a", "b"), Err(Error::NotWriteable));
        assert!(disk.list("").unwrap().is_empty());
    }

    #[test]
    fn test_install_replaces_wholesale() {
        let (_log, disk) = replicated();
        let mut first = MemoryDirectoryTree::new();
        assert!(first.write(&["old.txt"], b"old"));
        disk.install_tree(first);
        disk.install_tree(MemoryDirectoryTree::new());
        assert!(!disk.exists("old.txt"));
    }
}
