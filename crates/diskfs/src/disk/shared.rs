// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::{Disk, RealDisk};
use crate::change::{ChangeSink, ReplicaLink, UpdateAction, Visibility};
use crate::error::Result;
use crate::metadata::FileMetadata;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A [`RealDisk`] that publishes every successful mutation.
///
/// Used on the host for volumes other participants mirror in memory.
#[derive(Debug)]
pub struct SharedRealDisk {
    inner: RealDisk,
    link: ReplicaLink,
}

impl SharedRealDisk {
    pub fn new(
        name: impl Into<String>,
        base: impl Into<PathBuf>,
        visibility: Visibility,
        sink: Rc<dyn ChangeSink>,
    ) -> Result<Self> {
        let name = name.into();
        let inner = RealDisk::new(name.clone(), base, true)?;
        Ok(Self {
            inner,
            link: ReplicaLink::new(name, visibility, sink),
        })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        self.inner.base()
    }

    #[must_use]
    pub fn link(&self) -> &ReplicaLink {
        &self.link
    }

    fn perform(&self, path: &str, action: &UpdateAction, publish: bool) -> Result<()> {
        match action {
            UpdateAction::Write(data) => self.inner.write_binary(path, data)?,
            UpdateAction::MakeDir => self.inner.make_dir(path)?,
            UpdateAction::Delete => self.inner.delete(path)?,
        }
        if publish {
            self.link.emit(path, action.clone());
        }
        Ok(())
    }
}

impl Disk for SharedRealDisk {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list(&self, path: &str) -> Option<Vec<String>> {
        self.inner.list(path)
    }

    fn stat(&self, path: &str) -> Option<FileMetadata> {
        self.inner.stat(path)
    }

    fn read_binary(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.read_binary(path)
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
        self.inner.is_writeable()
    }

    fn apply_update(&self, path: &str, action: &UpdateAction) -> Result<()> {
        self.perform(path, action, false)
    }

    fn native_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.native_path(path)
    }
}
