// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Disk capability and its backends.
//!
//! - **RealDisk**: sandboxed directory on host storage
//! - **MemoryDisk**: in-memory tree, hydrated by a full sync
//! - **SharedRealDisk**: host storage that publishes every mutation
//!
//! All paths handed to a disk are disk-local (`a/b.txt`, no disk name) and
//! have already been normalized by the registry.

mod memory;
mod real;
mod shared;

pub use memory::MemoryDisk;
pub use real::RealDisk;
pub use shared::SharedRealDisk;

use crate::change::UpdateAction;
use crate::error::Result;
use crate::metadata::FileMetadata;

/// Uniform list/read/write/delete/mkdir surface over one path space
pub trait Disk {
    /// Name this disk is registered under
    fn name(&self) -> &str;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_some()
    }

    /// Entry names in a directory; `None` if it does not exist
    fn list(&self, path: &str) -> Option<Vec<String>>;

    fn stat(&self, path: &str) -> Option<FileMetadata>;

    /// Whole file content; a missing file is `None`, not an error
    fn read_binary(&self, path: &str) -> Option<Vec<u8>>;

    fn read_text(&self, path: &str) -> Option<String> {
        self.read_binary(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Create or replace a file. Does nothing on a read-only disk.
    fn write_binary(&self, path: &str, data: &[u8]) -> Result<()>;

    fn write_text(&self, path: &str, text: &str) -> Result<()> {
        self.write_binary(path, text.as_bytes())
    }

    fn make_dir(&self, path: &str) -> Result<()>;

    /// Remove a file or an empty directory
    fn delete(&self, path: &str) -> Result<()>;

    fn is_writeable(&self) -> bool;

    /// Perform a mutation that arrived from another participant.
    ///
    /// Replicating disks override this so the change is not published back.
    fn apply_update(&self, path: &str, action: &UpdateAction) -> Result<()> {
        match action {
            UpdateAction::Write(data) => self.write_binary(path, data),
            UpdateAction::MakeDir => self.make_dir(path),
            UpdateAction::Delete => self.delete(path),
        }
    }

    /// Downcast hook used to install a synced tree
    fn as_memory_disk(&self) -> Option<&MemoryDisk> {
        None
    }

    /// Host location of `path`, for disks backed by host storage
    fn native_path(&self, path: &str) -> Option<std::path::PathBuf> {
        let _ = path;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryDirectoryTree;
    use std::rc::Rc;

    fn variants(dir: &std::path::Path) -> Vec<Rc<dyn Disk>> {
        let log = Rc::new(crate::change::ChangeLog::new());
        let memory = MemoryDisk::new("mem", true);
        memory.install_tree(MemoryDirectoryTree::new());
        std::fs::create_dir(dir.join("real")).unwrap();
        std::fs::create_dir(dir.join("shared")).unwrap();
        vec![
            Rc::new(memory),
            Rc::new(RealDisk::new("real", dir.join("real"), true).unwrap()),
            Rc::new(
                SharedRealDisk::new(
                    "net",
                    dir.join("shared"),
                    crate::change::Visibility::Shared,
                    log,
                )
                .unwrap(),
            ),
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        let dir = tempfile::TempDir::new().unwrap();
        for disk in variants(dir.path()) {
            let bytes = vec![0u8, 1, 2, 255, 10, 13];
            disk.write_binary("blob.bin", &bytes).unwrap();
            assert_eq!(disk.read_binary("blob.bin"), Some(bytes), "{}", disk.name());

            disk.make_dir("sub").unwrap();
            disk.write_text("sub/note.txt", "héllo").unwrap();
            assert_eq!(disk.read_text("sub/note.txt").as_deref(), Some("héllo"));

            let mut names = disk.list("").unwrap();
            names.sort();
            assert_eq!(names, vec!["blob.bin", "sub"], "{}", disk.name());
        }
    }

    #[test]
    fn test_missing_is_soft() {
        let dir = tempfile::TempDir::new().unwrap();
        for disk in variants(dir.path()) {
            assert!(disk.read_binary("nope").is_none());
            assert!(disk.stat("nope").is_none());
            assert!(disk.list("nope").is_none());
            assert!(!disk.exists("nope"));
        }
    }

    #[test]
    fn test_directory_emptiness_every_variant() {
        let dir = tempfile::TempDir::new().unwrap();
        for disk in variants(dir.path()) {
            disk.make_dir("d").unwrap();
            disk.write_text("d/x", "1").unwrap();
            assert_eq!(
                disk.delete("d").unwrap_err().to_string(),
                "Directory not empty",
                "{}",
                disk.name()
            );
            disk.delete("d/x").unwrap();
            disk.delete("d").unwrap();
            assert!(!disk.exists("d"));
        }
    }
}
