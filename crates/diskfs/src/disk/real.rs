// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::Disk;
use crate::error::{Error, Result};
use crate::metadata::FileMetadata;
use crate::path::{has_parent_segment, segments};
use diagnostics::{log_debug, log_error};
use std::path::{Path, PathBuf};

/// Disk backed by a directory on host storage.
///
/// Every native path must stay below the canonical base directory; a path
/// that escapes (through `..` or a symlink) is rejected with
/// [`Error::EscapesDisk`] and logged as a contract violation.
#[derive(Debug)]
pub struct RealDisk {
    name: String,
    base: PathBuf,
    writeable: bool,
}

impl RealDisk {
    /// The base directory must already exist.
    pub fn new(name: impl Into<String>, base: impl Into<PathBuf>, writeable: bool) -> Result<Self> {
        let base = base.into();
        let canonical = base.canonicalize().map_err(|e| {
            Error::Io(format!("disk root '{}' cannot be resolved: {}", base.display(), e))
        })?;
        if !canonical.is_dir() {
            return Err(Error::Io(format!(
                "disk root '{}' is not a directory",
                canonical.display()
            )));
        }
        Ok(Self {
            name: name.into(),
            base: canonical,
            writeable,
        })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Map a disk-local path onto host storage, enforcing the sandbox
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if has_parent_segment(path) {
            return Err(self.escape(path));
        }
        let mut native = self.base.clone();
        for seg in segments(path) {
            native.push(seg);
        }

        // Canonicalize the deepest entry present so symlinks are seen,
        // dangling ones included.
        let mut existing = native.as_path();
        while std::fs::symlink_metadata(existing).is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let canonical = match existing.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) if existing.is_symlink() => return Err(self.escape(path)),
            Err(err) => return Err(err.into()),
        };
        if !canonical.starts_with(&self.base) {
            return Err(self.escape(path));
        }
        Ok(native)
    }

    fn escape(&self, path: &str) -> Error {
        log_error!(
            "path {path} escapes disk {disk} rooted at {base}",
            path,
            disk: self.name.as_str(),
            base: self.base.display().to_string()
        );
        Error::EscapesDisk(path.to_string())
    }

    fn list_native(native: &Path) -> std::io::Result<Vec<String>> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(native)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        files.sort();
        dirs.sort();
        files.extend(dirs);
        Ok(files)
    }
}

impl Disk for RealDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, path: &str) -> Option<Vec<String>> {
        let native = self.resolve(path).ok()?;
        Self::list_native(&native).ok()
    }

    fn stat(&self, path: &str) -> Option<FileMetadata> {
        let native = self.resolve(path).ok()?;
        let meta = std::fs::metadata(&native).ok()?;
        let mut result = FileMetadata::from_host(&meta);
        if meta.is_dir() {
            result.size = std::fs::read_dir(&native).map(|rd| rd.count() as u64).unwrap_or(0);
        }
        Some(result)
    }

    fn read_binary(&self, path: &str) -> Option<Vec<u8>> {
        let native = self.resolve(path).ok()?;
        std::fs::read(native).ok()
    }

    fn write_binary(&self, path: &str, data: &[u8]) -> Result<()> {
        if !self.writeable {
            return Err(Error::NotWriteable);
        }
        let native = self.resolve(path)?;
        if native.is_dir() {
            return Err(Error::AlreadyExists);
        }
        std::fs::write(&native, data)?;
        log_debug!("wrote {bytes} bytes to {disk}:{path}", bytes: data.len(), disk: self.name.as_str(), path);
        Ok(())
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        if !self.writeable {
            return Err(Error::NotWriteable);
        }
        if segments(path).is_empty() {
            return Err(Error::InvalidPath);
        }
        let native = self.resolve(path)?;
        std::fs::create_dir(&native)?;
        log_debug!("created directory {disk}:{path}", disk: self.name.as_str(), path);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        if !self.writeable {
            return Err(Error::NotWriteable);
        }
        if segments(path).is_empty() {
            return Err(Error::InvalidPath);
        }
        let native = self.resolve(path)?;
        let meta = std::fs::symlink_metadata(&native)?;
        if meta.is_dir() {
            if std::fs::read_dir(&native)?.next().is_some() {
                return Err(Error::DirectoryNotEmpty);
            }
            std::fs::remove_dir(&native)?;
        } else {
            std::fs::remove_file(&native)?;
        }
        log_debug!("deleted {disk}:{path}", disk: self.name.as_str(), path);
        Ok(())
    }

    fn is_writeable(&self) -> bool {
        self.writeable
    }

    fn native_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_disk(writeable: bool) -> (TempDir, RealDisk) {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("hello.txt"), b"Hello, World!").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("subdir/nested.txt"), b"nested content").unwrap();
        let disk = RealDisk::new("usr", dir.path(), writeable).unwrap();
        (dir, disk)
    }

    #[test]
    fn test_new_rejects_missing_root() {
        assert!(RealDisk::new("usr", "/nonexistent/path/foo", true).is_err());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let (dir, _disk) = create_test_disk(true);
        assert!(RealDisk::new("usr", dir.path().join("hello.txt"), true).is_err());
    }

    #[test]
    fn test_list_and_read() {
        let (_dir, disk) = create_test_disk(true);
        assert_eq!(disk.list("").unwrap(), vec!["hello.txt", "subdir"]);
        assert_eq!(disk.read_text("subdir/nested.txt").unwrap(), "nested content");
        let meta = disk.stat("hello.txt").unwrap();
        assert_eq!(meta.size, 13);
        assert!(!meta.is_directory);
        assert_eq!(disk.stat("subdir").unwrap().size, 1);
    }

    #[test]
    fn test_parent_segments_rejected() {
        let (_dir, disk) = create_test_disk(true);
        let err = disk.resolve("subdir/../../etc/passwd").unwrap_err();
        assert!(err.is_contract_violation());
        assert!(disk.read_binary("../outside").is_none());
        assert_eq!(
            disk.write_text("../outside", "x"),
            Err(Error::EscapesDisk("../outside".into()))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, disk) = create_test_disk(true);
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), b"s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        assert!(disk.read_binary("link/secret").is_none());
        assert!(matches!(disk.resolve("link/secret"), Err(Error::EscapesDisk(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_rejected() {
        let (dir, disk) = create_test_disk(true);
        let outside = TempDir::new().unwrap();
        let planted = outside.path().join("planted.txt");
        std::os::unix::fs::symlink(&planted, dir.path().join("link")).unwrap();

        assert_eq!(disk.write_text("link", "pwned"), Err(Error::EscapesDisk("link".into())));
        assert!(!planted.exists());
        assert!(matches!(disk.resolve("link/deeper.txt"), Err(Error::EscapesDisk(_))));
    }

    #[test]
    fn test_read_only() {
        let (_dir, disk) = create_test_disk(false);
        assert_eq!(disk.write_text("new.txt", "x"), Err(Error::NotWriteable));
        assert_eq!(disk.delete("hello.txt"), Err(Error::NotWriteable));
        assert_eq!(disk.make_dir("d"), Err(Error::NotWriteable));
        assert!(!disk.exists("new.txt"));
        assert!(disk.exists("hello.txt"));
    }

    #[test]
    fn test_write_without_parent_fails() {
        let (_dir, disk) = create_test_disk(true);
        assert_eq!(disk.write_text("missing/new.txt", "x"), Err(Error::FileNotFound));
    }

    #[test]
    fn test_make_dir_existing() {
        let (_dir, disk) = create_test_disk(true);
        assert_eq!(disk.make_dir("subdir"), Err(Error::AlreadyExists));
        assert_eq!(disk.delete("missing"), Err(Error::FileNotFound));
    }
}
