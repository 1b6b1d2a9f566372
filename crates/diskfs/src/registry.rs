// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-participant disk table and virtual path routing.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::path::{resolve_path, split_disk};
use diagnostics::{log_info, log_warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Name of the process-wide read-only disk every registry routes to
pub const SYSTEM_DISK: &str = "sys";

/// The disks one participant can reach, keyed by name.
///
/// `sys` is never stored in the table; it always routes to the system disk
/// handed over at construction, which is shared by every registry.
pub struct DiskRegistry {
    identity: u64,
    system: Rc<dyn Disk>,
    disks: RefCell<BTreeMap<String, Rc<dyn Disk>>>,
}

impl DiskRegistry {
    pub fn new(identity: u64, system: Rc<dyn Disk>) -> Self {
        Self {
            identity,
            system,
            disks: RefCell::new(BTreeMap::new()),
        }
    }

    /// Stable participant identity this registry belongs to
    #[must_use]
    pub fn identity(&self) -> u64 {
        self.identity
    }

    #[must_use]
    pub fn system(&self) -> Rc<dyn Disk> {
        self.system.clone()
    }

    /// Register a disk under its own name
    pub fn mount(&self, disk: Rc<dyn Disk>) -> Result<()> {
        let name = disk.name().to_string();
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidPath);
        }
        if name == SYSTEM_DISK {
            log_warn!("refusing to mount over the system disk");
            return Err(Error::AlreadyExists);
        }
        let mut disks = self.disks.borrow_mut();
        if disks.contains_key(&name) {
            return Err(Error::AlreadyExists);
        }
        log_info!(
            "mounted {name} for participant {identity} (writeable: {writeable})",
            name: name.as_str(),
            identity: self.identity,
            writeable: disk.is_writeable()
        );
        _ = disks.insert(name, disk);
        Ok(())
    }

    pub fn unmount(&self, name: &str) -> Option<Rc<dyn Disk>> {
        let removed = self.disks.borrow_mut().remove(name);
        if removed.is_some() {
            log_info!("unmounted {name} for participant {identity}", name, identity: self.identity);
        }
        removed
    }

    /// Disk registered as `name`; `sys` is always present
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Disk>> {
        if name == SYSTEM_DISK {
            return Some(self.system.clone());
        }
        self.disks.borrow().get(name).cloned()
    }

    /// Every reachable disk name, `sys` first
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![SYSTEM_DISK.to_string()];
        names.extend(self.disks.borrow().keys().cloned());
        names
    }

    /// Route a canonical virtual path to its disk and disk-local remainder.
    ///
    /// Returns `None` when the path is not absolute or names no known disk.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<(Rc<dyn Disk>, String)> {
        let (name, local) = split_disk(path)?;
        let disk = self.get(name)?;
        Some((disk, local.trim_end_matches('/').to_string()))
    }

    /// Normalize an absolute virtual path, then route it
    pub(crate) fn locate(&self, path: &str) -> Result<(Rc<dyn Disk>, String)> {
        if !path.starts_with('/') {
            return Err(Error::InvalidPath);
        }
        let canonical = resolve_path("/", path)?;
        self.resolve(&canonical).ok_or(Error::DiskNotFound)
    }
}

impl fmt::Debug for DiskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskRegistry")
            .field("identity", &self.identity)
            .field("disks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;
    use crate::tree::MemoryDirectoryTree;

    fn registry() -> DiskRegistry {
        let sys = MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), false);
        let registry = DiskRegistry::new(7, Rc::new(sys));
        registry
            .mount(Rc::new(MemoryDisk::with_tree(
                "usr",
                MemoryDirectoryTree::new(),
                true,
            )))
            .unwrap();
        registry
    }

    #[test]
    fn test_routes_by_first_segment() {
        let registry = registry();
        let (disk, local) = registry.resolve("/usr/lib/a.ms").unwrap();
        assert_eq!(disk.name(), "usr");
        assert_eq!(local, "lib/a.ms");

        let (disk, local) = registry.resolve("/sys").unwrap();
        assert_eq!(disk.name(), "sys");
        assert_eq!(local, "");

        let (_, local) = registry.resolve("/usr/").unwrap();
        assert_eq!(local, "");
    }

    #[test]
    fn test_unknown_disk_is_none() {
        let registry = registry();
        assert!(registry.resolve("/net/a.txt").is_none());
        assert!(registry.resolve("usr/a.txt").is_none());
        assert!(registry.resolve("/").is_none());
        assert_eq!(registry.locate("/net/x").err(), Some(Error::DiskNotFound));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = registry();
        assert!(registry.resolve("/USR/a").is_none());
        assert_eq!(registry.names(), vec!["sys", "usr"]);
        assert_eq!(registry.identity(), 7);
    }

    #[test]
    fn test_sys_cannot_be_mounted() {
        let registry = registry();
        let fake = Rc::new(MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), true));
        assert_eq!(registry.mount(fake), Err(Error::AlreadyExists));
        assert!(!registry.get("sys").unwrap().is_writeable());
    }

    #[test]
    fn test_duplicate_and_unmount() {
        let registry = registry();
        let again = Rc::new(MemoryDisk::new("usr", true));
        assert_eq!(registry.mount(again), Err(Error::AlreadyExists));
        assert!(registry.unmount("usr").is_some());
        assert!(registry.unmount("usr").is_none());
        assert!(registry.get("usr").is_none());
        assert!(registry.unmount("sys").is_none());
    }

    #[test]
    fn test_locate_normalizes_first() {
        let registry = registry();
        let (disk, local) = registry.locate("/usr/./lib/../a.txt").unwrap();
        assert_eq!(disk.name(), "usr");
        assert_eq!(local, "a.txt");
        assert_eq!(registry.locate("/usr/..").err(), Some(Error::InvalidPath));
        assert_eq!(registry.locate("a.txt").err(), Some(Error::InvalidPath));
    }
}
