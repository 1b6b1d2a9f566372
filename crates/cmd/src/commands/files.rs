// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! One-shot file commands over the local participant's disks.

use anyhow::{Result, anyhow};
use diagnostics::log_info;
use diskfs::DiskRegistry;
use diskfs::path::join;
use std::io::Write;

use crate::common::format_file_size;

pub fn list_command(registry: &DiskRegistry, path: &str, out: &mut impl Write) -> Result<()> {
    let names = registry
        .list(path)
        .ok_or_else(|| anyhow!("{path}: {}", diskfs::Error::FileNotFound))?;

    for name in names {
        match registry.stat(&join(path, &name)) {
            Some(meta) if meta.is_directory => writeln!(out, "{:>8}  {name}/", "-")?,
            Some(meta) => writeln!(out, "{:>8}  {name}", format_file_size(meta.size))?,
            // disks listed at the root have no stat of their own
            None => writeln!(out, "{:>8}  {name}/", "-")?,
        }
    }
    Ok(())
}

pub fn cat_command(registry: &DiskRegistry, path: &str, out: &mut impl Write) -> Result<()> {
    let data = registry
        .read_binary(path)
        .ok_or_else(|| anyhow!("{path}: {}", diskfs::Error::FileNotFound))?;
    out.write_all(&data)?;
    Ok(())
}

pub fn mkdir_command(registry: &DiskRegistry, path: &str) -> Result<()> {
    registry
        .make_dir(path)
        .map_err(|err| anyhow!("{path}: {err}"))?;
    log_info!("Directory created: {path}", path);
    Ok(())
}

pub fn remove_command(registry: &DiskRegistry, path: &str) -> Result<()> {
    registry.delete(path).map_err(|err| anyhow!("{path}: {err}"))?;
    log_info!("Removed: {path}", path);
    Ok(())
}

/// Copy, or move when `delete_source` is set
pub fn transfer_command(
    registry: &DiskRegistry,
    source: &str,
    dest: &str,
    delete_source: bool,
    overwrite: bool,
) -> Result<()> {
    registry
        .move_or_copy(source, dest, delete_source, overwrite)
        .map_err(|err| anyhow!("{source} -> {dest}: {err}"))?;
    let verb = if delete_source { "Moved" } else { "Copied" };
    log_info!("{verb} {source} to {dest}", verb, source, dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{VcompConfig, Workspace};
    use std::rc::Rc;
    use tempfile::TempDir;

    fn registry(tmp: &TempDir) -> Rc<DiskRegistry> {
        Workspace::with_config(tmp.path().to_path_buf(), VcompConfig::default())
            .registry()
            .unwrap()
    }

    #[test]
    fn test_list_marks_directories() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(&tmp);
        registry.make_dir("/usr/lib").unwrap();
        registry.write_text("/usr/a.txt", "hello").unwrap();

        let mut out = Vec::new();
        list_command(&registry, "/usr", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("      5B  a.txt\n"));
        assert!(text.contains("       -  lib/\n"));

        let mut out = Vec::new();
        list_command(&registry, "/", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "       -  sys/\n       -  net/\n       -  usr/\n");
    }

    #[test]
    fn test_cat_and_missing() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(&tmp);
        registry.write_text("/net/board.txt", "posted").unwrap();

        let mut out = Vec::new();
        cat_command(&registry, "/net/board.txt", &mut out).unwrap();
        assert_eq!(out, b"posted");

        let err = cat_command(&registry, "/net/none.txt", &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "/net/none.txt: Error: file not found");
    }

    #[test]
    fn test_move_keeps_source_on_conflict() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(&tmp);
        registry.write_text("/usr/a.txt", "mine").unwrap();
        registry.write_text("/net/a.txt", "theirs").unwrap();

        let err = transfer_command(&registry, "/usr/a.txt", "/net/a.txt", true, false).unwrap_err();
        assert!(err.to_string().ends_with("Error: target file already exists"));
        assert_eq!(registry.read_text("/usr/a.txt").as_deref(), Some("mine"));

        transfer_command(&registry, "/usr/a.txt", "/net/a.txt", true, true).unwrap();
        assert!(!registry.exists("/usr/a.txt"));
        assert_eq!(registry.read_text("/net/a.txt").as_deref(), Some("mine"));
    }

    #[test]
    fn test_mkdir_and_remove() {
        let tmp = TempDir::new().unwrap();
        let registry = registry(&tmp);
        mkdir_command(&registry, "/usr/docs").unwrap();
        registry.write_text("/usr/docs/x", "1").unwrap();
        let err = remove_command(&registry, "/usr/docs").unwrap_err();
        assert_eq!(err.to_string(), "/usr/docs: Directory not empty");
        remove_command(&registry, "/usr/docs/x").unwrap();
        remove_command(&registry, "/usr/docs").unwrap();
        assert!(!tmp.path().join("usr/docs").exists());
    }
}
