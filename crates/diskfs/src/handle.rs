// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Buffered file handles.
//!
//! A handle holds the whole file in memory for its lifetime. Nothing
//! reaches the disk until [`OpenFileHandle::close`], and only when the
//! buffer was modified through a writable mode.

use crate::disk::Disk;
use crate::error::{Error, Result};
use diagnostics::{log_debug, log_error};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// The seven open modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// `r`
    Read,
    /// `r+`
    ReadUpdate,
    /// `w`
    Write,
    /// `w+`
    WriteUpdate,
    /// `rw+`
    ReadWriteUpdate,
    /// `a`
    Append,
    /// `a+`
    AppendUpdate,
}

impl AccessMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::ReadUpdate => "r+",
            AccessMode::Write => "w",
            AccessMode::WriteUpdate => "w+",
            AccessMode::ReadWriteUpdate => "rw+",
            AccessMode::Append => "a",
            AccessMode::AppendUpdate => "a+",
        }
    }

    /// The file has to exist before opening
    #[must_use]
    pub fn must_exist(&self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadUpdate)
    }

    /// The buffer starts with the current content
    #[must_use]
    pub fn preload(&self) -> bool {
        !matches!(self, AccessMode::Write | AccessMode::WriteUpdate)
    }

    #[must_use]
    pub fn readable(&self) -> bool {
        !matches!(self, AccessMode::Write | AccessMode::Append)
    }

    #[must_use]
    pub fn writeable(&self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    /// The cursor starts after the existing content
    #[must_use]
    pub fn starts_at_end(&self) -> bool {
        matches!(self, AccessMode::Append | AccessMode::AppendUpdate)
    }
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(AccessMode::Read),
            "r+" => Ok(AccessMode::ReadUpdate),
            "w" => Ok(AccessMode::Write),
            "w+" => Ok(AccessMode::WriteUpdate),
            "rw+" => Ok(AccessMode::ReadWriteUpdate),
            "a" => Ok(AccessMode::Append),
            "a+" => Ok(AccessMode::AppendUpdate),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width of the UTF-8 sequence introduced by `lead`; stray bytes count as one
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// One open file on one disk
pub struct OpenFileHandle {
    disk: Rc<dyn Disk>,
    path: String,
    mode: AccessMode,
    buffer: Vec<u8>,
    cursor: usize,
    dirty: bool,
    open: bool,
    error: Option<String>,
}

impl OpenFileHandle {
    /// Open `path` on `disk` with a mode string such as `"r+"`
    pub fn open(disk: Rc<dyn Disk>, path: &str, mode: &str) -> Result<Self> {
        let mode = mode.parse::<AccessMode>().inspect_err(|err| {
            log_error!("open {path}: {err}", path, err: err.to_string().as_str());
        })?;
        Self::open_with(disk, path, mode)
    }

    pub fn open_with(disk: Rc<dyn Disk>, path: &str, mode: AccessMode) -> Result<Self> {
        let existing = disk.read_binary(path);
        if mode.must_exist() && existing.is_none() {
            return Err(Error::FileNotFound);
        }
        let buffer = if mode.preload() {
            existing.unwrap_or_default()
        } else {
            Vec::new()
        };
        let cursor = if mode.starts_at_end() { buffer.len() } else { 0 };
        log_debug!(
            "opened {disk}:{path} mode {mode} ({bytes} bytes)",
            disk: disk.name(),
            path,
            mode: mode.as_str(),
            bytes: buffer.len()
        );
        Ok(Self {
            disk,
            path: path.to_string(),
            mode,
            buffer,
            cursor,
            dirty: false,
            open: true,
            error: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Text of the most recent failure, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.error = Some(err.to_string());
        Err(err)
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            self.fail(Error::NotOpen)
        }
    }

    fn ensure_readable(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.mode.readable() {
            Ok(())
        } else {
            self.fail(Error::NotReadable)
        }
    }

    /// Append text to the buffer; the disk sees it at close
    pub fn write(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if !self.mode.writeable() {
            return self.fail(Error::NotWritable);
        }
        if !self.disk.is_writeable() {
            return self.fail(Error::NotWriteable);
        }
        self.buffer.extend_from_slice(data);
        self.cursor = self.buffer.len();
        self.dirty = true;
        Ok(())
    }

    /// Everything from the cursor to the end
    pub fn read_to_end(&mut self) -> Result<String> {
        self.ensure_readable()?;
        let text = String::from_utf8_lossy(&self.buffer[self.cursor..]).into_owned();
        self.cursor = self.buffer.len();
        Ok(text)
    }

    /// Next line without its terminator; `None` at end of file
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.ensure_readable()?;
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let rest = &self.buffer[self.cursor..];
        let (line, consumed) = match rest.iter().position(|b| *b == b'\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let text = String::from_utf8_lossy(line).into_owned();
        self.cursor += consumed;
        Ok(Some(text))
    }

    /// Up to `count` characters (code points, not bytes)
    pub fn read_chars(&mut self, count: usize) -> Result<String> {
        self.ensure_readable()?;
        let start = self.cursor;
        let mut end = start;
        for _ in 0..count {
            if end >= self.buffer.len() {
                break;
            }
            end = (end + utf8_width(self.buffer[end])).min(self.buffer.len());
        }
        self.cursor = end;
        Ok(String::from_utf8_lossy(&self.buffer[start..end]).into_owned())
    }

    pub fn position(&mut self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.cursor as u64)
    }

    /// Move the cursor; positions past the end clamp to the end
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        self.ensure_open()?;
        self.cursor = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(self.buffer.len());
        Ok(())
    }

    pub fn at_end(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.cursor >= self.buffer.len())
    }

    /// Flush a modified buffer to the disk and invalidate the handle
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.open = false;
        if self.dirty && self.mode.writeable() {
            self.dirty = false;
            if let Err(err) = self.disk.write_binary(&self.path, &self.buffer) {
                return self.fail(err);
            }
            log_debug!(
                "flushed {bytes} bytes to {disk}:{path}",
                bytes: self.buffer.len(),
                disk: self.disk.name(),
                path: self.path.as_str()
            );
        }
        Ok(())
    }
}

impl fmt::Debug for OpenFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFileHandle")
            .field("disk", &self.disk.name())
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("len", &self.buffer.len())
            .field("cursor", &self.cursor)
            .field("dirty", &self.dirty)
            .field("open", &self.open)
            .finish()
    }
}

impl Drop for OpenFileHandle {
    fn drop(&mut self) {
        if self.open && self.dirty {
            log_debug!(
                "discarding unflushed handle on {disk}:{path}",
                disk: self.disk.name(),
                path: self.path.as_str()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;
    use crate::tree::MemoryDirectoryTree;

    fn disk_with(files: &[(&str, &str)], writeable: bool) -> Rc<dyn Disk> {
        let mut tree = MemoryDirectoryTree::new();
        for (name, content) in files {
            assert!(tree.write(&[name], content.as_bytes()));
        }
        Rc::new(MemoryDisk::with_tree("usr", tree, writeable))
    }

    #[test]
    fn test_mode_table() {
        for (text, exist, preload, read, write) in [
            ("r", true, true, true, false),
            ("r+", true, true, true, true),
            ("w", false, false, false, true),
            ("w+", false, false, true, true),
            ("rw+", false, true, true, true),
            ("a", false, true, false, true),
            ("a+", false, true, true, true),
        ] {
            let mode: AccessMode = text.parse().unwrap();
            assert_eq!(mode.as_str(), text);
            assert_eq!(mode.must_exist(), exist, "{text}");
            assert_eq!(mode.preload(), preload, "{text}");
            assert_eq!(mode.readable(), read, "{text}");
            assert_eq!(mode.writeable(), write, "{text}");
        }
    }

    #[test]
    fn test_invalid_mode() {
        let disk = disk_with(&[], true);
        let err = OpenFileHandle::open(disk, "x.txt", "rw").unwrap_err();
        assert_eq!(err.to_string(), "Error: invalid file mode (rw)");
    }

    #[test]
    fn test_missing_file_modes() {
        let disk = disk_with(&[], true);
        for mode in ["r", "r+"] {
            let err = OpenFileHandle::open(disk.clone(), "nope.txt", mode).unwrap_err();
            assert_eq!(err, Error::FileNotFound);
        }
        for mode in ["w", "w+", "rw+", "a", "a+"] {
            let mut handle = OpenFileHandle::open(disk.clone(), "new.txt", mode).unwrap();
            handle.write(mode).unwrap();
            handle.close().unwrap();
            assert!(disk.exists("new.txt"), "{mode}");
            disk.delete("new.txt").unwrap();
        }
    }

    #[test]
    fn test_buffered_until_close() {
        let disk = disk_with(&[("x.txt", "old")], true);
        let mut handle = OpenFileHandle::open(disk.clone(), "x.txt", "w").unwrap();
        handle.write("hi").unwrap();
        assert_eq!(disk.read_text("x.txt").as_deref(), Some("old"));
        handle.close().unwrap();
        assert_eq!(disk.read_text("x.txt").as_deref(), Some("hi"));
    }

    #[test]
    fn test_append_keeps_content() {
        let disk = disk_with(&[("log.txt", "one\n")], true);
        let mut handle = OpenFileHandle::open(disk.clone(), "log.txt", "a").unwrap();
        assert_eq!(handle.position().unwrap(), 4);
        handle.write("two\n").unwrap();
        assert_eq!(handle.read_line(), Err(Error::NotReadable));
        handle.close().unwrap();
        assert_eq!(disk.read_text("log.txt").as_deref(), Some("one\ntwo\n"));
    }

    #[test]
    fn test_read_lines() {
        let disk = disk_with(&[("t.txt", "alpha\r\nbeta\ngamma")], true);
        let mut handle = OpenFileHandle::open(disk, "t.txt", "r").unwrap();
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("alpha"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("beta"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("gamma"));
        assert_eq!(handle.read_line().unwrap(), None);
        assert!(handle.at_end().unwrap());
    }

    #[test]
    fn test_read_chars_counts_code_points() {
        let disk = disk_with(&[("u.txt", "héllo wörld")], true);
        let mut handle = OpenFileHandle::open(disk, "u.txt", "r").unwrap();
        assert_eq!(handle.read_chars(2).unwrap(), "hé");
        assert_eq!(handle.position().unwrap(), 3);
        assert_eq!(handle.read_chars(4).unwrap(), "llo ");
        assert_eq!(handle.read_to_end().unwrap(), "wörld");
        assert_eq!(handle.read_chars(5).unwrap(), "");
    }

    #[test]
    fn test_seek_clamps() {
        let disk = disk_with(&[("s.txt", "abcdef")], true);
        let mut handle = OpenFileHandle::open(disk, "s.txt", "r").unwrap();
        handle.set_position(4).unwrap();
        assert_eq!(handle.read_to_end().unwrap(), "ef");
        handle.set_position(100).unwrap();
        assert_eq!(handle.position().unwrap(), 6);
    }

    #[test]
    fn test_read_only_handle_never_writes() {
        let disk = disk_with(&[("r.txt", "data")], true);
        let mut handle = OpenFileHandle::open(disk, "r.txt", "r").unwrap();
        assert_eq!(handle.write("x"), Err(Error::NotWritable));
        assert_eq!(handle.error(), Some("Error: file not open for writing"));
    }

    #[test]
    fn test_read_only_disk_rejects_write() {
        let disk = disk_with(&[("r.txt", "data")], false);
        let mut handle = OpenFileHandle::open(disk, "r.txt", "r+").unwrap();
        assert_eq!(handle.write("x"), Err(Error::NotWriteable));
        assert_eq!(handle.read_to_end().unwrap(), "data");
        handle.close().unwrap();
    }

    #[test]
    fn test_closed_handle_fails() {
        let disk = disk_with(&[("c.txt", "data")], true);
        let mut handle = OpenFileHandle::open(disk, "c.txt", "rw+").unwrap();
        handle.close().unwrap();
        assert!(!handle.is_open());
        assert_eq!(handle.read_to_end(), Err(Error::NotOpen));
        assert_eq!(handle.write("x"), Err(Error::NotOpen));
        assert_eq!(handle.read_line(), Err(Error::NotOpen));
        assert_eq!(handle.close(), Err(Error::NotOpen));
        assert_eq!(handle.error(), Some("file is not open"));
    }

    #[test]
    fn test_clean_close_does_not_write() {
        let disk = disk_with(&[], true);
        let mut handle = OpenFileHandle::open(disk.clone(), "ghost.txt", "w").unwrap();
        handle.close().unwrap();
        assert!(!disk.exists("ghost.txt"));
    }
}
