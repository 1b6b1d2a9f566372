// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, anyhow};
use diagnostics::log_debug;
use diskfs::{Disk, DiskRegistry, MemoryDirectoryTree, MemoryDisk, RealDisk, resolve_path};
use serde::{Deserialize, Serialize};
use shell::ShellConfig;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Environment variable naming the directory that holds the disks
pub const HOME_ENV: &str = "VCOMP_HOME";

/// Config file looked up inside the home directory
pub const CONFIG_FILE: &str = "vcomp.yaml";

/// Identity used for the local participant
pub const LOCAL_IDENTITY: u64 = 1;

/// Get the home path with an optional override, falling back to VCOMP_HOME
pub fn get_home_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    env::var(HOME_ENV)
        .map_err(|_| anyhow!("{HOME_ENV} environment variable not set"))
        .map(PathBuf::from)
}

/// Extra host directory mounted as a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Host directory; relative paths are taken from the home directory
    pub path: PathBuf,

    #[serde(default)]
    pub writeable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VcompConfig {
    #[serde(default)]
    pub shell: ShellConfig,

    /// Disk name to host directory
    #[serde(default)]
    pub mounts: BTreeMap<String, MountConfig>,
}

impl VcompConfig {
    /// Read `path`, or the defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log_debug!("no config at {path}, using defaults", path: path.display().to_string());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse YAML configuration {}", path.display()))
    }
}

/// Home directory plus its configuration
#[derive(Debug, Clone)]
pub struct Workspace {
    pub home: PathBuf,
    pub config: VcompConfig,
}

impl Workspace {
    pub fn open(home: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let home = get_home_with_override(home)?;
        let config_path = config.unwrap_or_else(|| home.join(CONFIG_FILE));
        let config = VcompConfig::load(&config_path)?;
        Ok(Self { home, config })
    }

    #[must_use]
    pub fn with_config(home: PathBuf, config: VcompConfig) -> Self {
        Self { home, config }
    }

    /// Registry for the local participant.
    ///
    /// `sys` is `<home>/sys` read-only (empty when missing), `usr` and `net`
    /// are writeable directories created on demand, and every configured
    /// mount is added after them.
    pub fn registry(&self) -> Result<Rc<DiskRegistry>> {
        let sys_root = self.home.join("sys");
        let system: Rc<dyn Disk> = if sys_root.is_dir() {
            Rc::new(RealDisk::new("sys", &sys_root, false)?)
        } else {
            Rc::new(MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), false))
        };
        let registry = DiskRegistry::new(LOCAL_IDENTITY, system);

        for name in ["usr", "net"] {
            let root = self.home.join(name);
            std::fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create {}", root.display()))?;
            registry.mount(Rc::new(RealDisk::new(name, &root, true)?))?;
        }

        for (name, mount) in &self.config.mounts {
            let root = if mount.path.is_absolute() {
                mount.path.clone()
            } else {
                self.home.join(&mount.path)
            };
            registry
                .mount(Rc::new(RealDisk::new(name.as_str(), &root, mount.writeable)?))
                .with_context(|| format!("Failed to mount {name}"))?;
        }

        Ok(Rc::new(registry))
    }

    /// Resolve a command-line path against the shell's initial directory
    pub fn virtual_path(&self, path: &str) -> Result<String> {
        Ok(resolve_path(&self.config.shell.initial_dir, path)?)
    }
}

/// Helper function to format file sizes
#[must_use]
pub fn format_file_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{size}B")
    }
}
