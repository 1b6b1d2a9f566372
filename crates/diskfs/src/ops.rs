// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! File operations over absolute virtual paths.
//!
//! These are what script intrinsics call. Lookups that find nothing come
//! back as `None`; everything else reports one of the sentinel errors.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::handle::OpenFileHandle;
use crate::metadata::FileMetadata;
use crate::path::join;
use crate::registry::DiskRegistry;
use diagnostics::log_debug;
use std::rc::Rc;

impl DiskRegistry {
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_some()
    }

    /// Entry names under `path`; listing `/` yields the disk names
    #[must_use]
    pub fn list(&self, path: &str) -> Option<Vec<String>> {
        if path.trim_end_matches('/').is_empty() && path.starts_with('/') {
            return Some(self.names());
        }
        let (disk, local) = self.locate(path).ok()?;
        disk.list(&local)
    }

    #[must_use]
    pub fn stat(&self, path: &str) -> Option<FileMetadata> {
        let (disk, local) = self.locate(path).ok()?;
        disk.stat(&local)
    }

    #[must_use]
    pub fn read_binary(&self, path: &str) -> Option<Vec<u8>> {
        let (disk, local) = self.locate(path).ok()?;
        disk.read_binary(&local)
    }

    #[must_use]
    pub fn read_text(&self, path: &str) -> Option<String> {
        let (disk, local) = self.locate(path).ok()?;
        disk.read_text(&local)
    }

    pub fn write_binary(&self, path: &str, data: &[u8]) -> Result<()> {
        let (disk, local) = self.locate(path)?;
        disk.write_binary(&local, data)
    }

    pub fn write_text(&self, path: &str, text: &str) -> Result<()> {
        self.write_binary(path, text.as_bytes())
    }

    pub fn make_dir(&self, path: &str) -> Result<()> {
        let (disk, local) = self.locate(path)?;
        disk.make_dir(&local)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        let (disk, local) = self.locate(path)?;
        disk.delete(&local)
    }

    pub fn open(&self, path: &str, mode: &str) -> Result<OpenFileHandle> {
        let (disk, local) = self.locate(path)?;
        OpenFileHandle::open(disk, &local, mode)
    }

    /// Copy a file or directory tree, optionally removing the source.
    ///
    /// The source is only deleted once the whole target is in place; any
    /// failure leaves it untouched.
    pub fn move_or_copy(
        &self,
        source: &str,
        target: &str,
        delete_source: bool,
        overwrite: bool,
    ) -> Result<()> {
        let (src_disk, src) = self.locate(source).map_err(|err| match err {
            Error::DiskNotFound => Error::SourceDiskNotFound,
            other => other,
        })?;
        let (dst_disk, dst) = self.locate(target).map_err(|err| match err {
            Error::DiskNotFound => Error::TargetDiskNotFound,
            other => other,
        })?;

        let src_meta = src_disk.stat(&src).ok_or(Error::FileNotFound)?;
        if src.is_empty() || dst.is_empty() {
            return Err(Error::InvalidPath);
        }
        if !dst_disk.is_writeable() || (delete_source && !src_disk.is_writeable()) {
            return Err(Error::NotWriteable);
        }
        if dst_disk.exists(&dst) && !overwrite {
            return Err(Error::TargetExists);
        }

        let same_disk = src_disk.name() == dst_disk.name();
        if same_disk && src == dst {
            return Ok(());
        }
        if same_disk && src_meta.is_directory && dst.starts_with(&format!("{src}/")) {
            return Err(Error::InvalidPath);
        }

        copy_entry(src_disk.as_ref(), &src, dst_disk.as_ref(), &dst, overwrite)?;
        // memory disks drop writes whose parent is missing
        if !landed(src_disk.as_ref(), &src, dst_disk.as_ref(), &dst) {
            return Err(Error::FileNotFound);
        }
        log_debug!(
            "copied {source} to {target}",
            source,
            target
        );

        if delete_source {
            delete_entry(src_disk.as_ref(), &src)?;
        }
        Ok(())
    }

    /// Every disk this participant can reach, handy for intrinsics
    #[must_use]
    pub fn disks(&self) -> Vec<Rc<dyn Disk>> {
        self.names().iter().filter_map(|n| self.get(n)).collect()
    }
}

fn copy_entry(
    src_disk: &dyn Disk,
    src: &str,
    dst_disk: &dyn Disk,
    dst: &str,
    overwrite: bool,
) -> Result<()> {
    let meta = src_disk.stat(src).ok_or(Error::FileNotFound)?;
    let existing = dst_disk.stat(dst);
    if meta.is_directory {
        match existing {
            None => dst_disk.make_dir(dst)?,
            Some(e) if !e.is_directory => return Err(Error::TargetExists),
            Some(_) => {}
        }
        for name in src_disk.list(src).unwrap_or_default() {
            copy_entry(
                src_disk,
                &join(src, &name),
                dst_disk,
                &join(dst, &name),
                overwrite,
            )?;
        }
        Ok(())
    } else {
        match existing {
            Some(e) if e.is_directory => return Err(Error::TargetExists),
            Some(_) if !overwrite => return Err(Error::TargetExists),
            _ => {}
        }
        let data = src_disk.read_binary(src).ok_or(Error::FileNotFound)?;
        dst_disk.write_binary(dst, &data)
    }
}

/// Whether `dst` now holds what `src` holds: a directory for a directory,
/// the same bytes for a file
fn landed(src_disk: &dyn Disk, src: &str, dst_disk: &dyn Disk, dst: &str) -> bool {
    match (src_disk.stat(src), dst_disk.stat(dst)) {
        (Some(s), Some(d)) if s.is_directory => d.is_directory,
        (Some(_), Some(d)) if !d.is_directory => {
            dst_disk.read_binary(dst).is_some_and(|data| src_disk.read_binary(src) == Some(data))
        }
        _ => false,
    }
}

fn delete_entry(disk: &dyn Disk, path: &str) -> Result<()> {
    if let Some(meta) = disk.stat(path)
        && meta.is_directory
    {
        for name in disk.list(path).unwrap_or_default() {
            delete_entry(disk, &join(path, &name))?;
        }
    }
    disk.delete(path)
}
