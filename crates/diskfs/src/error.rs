// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by disks, handles and the registry.
///
/// The `Display` text of each variant is the exact string handed back to
/// scripts, which branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Error: file not found")]
    FileNotFound,

    #[error("Error: disk is not writeable")]
    NotWriteable,

    #[error("Error: disk not found")]
    DiskNotFound,

    #[error("Error: target disk not found")]
    TargetDiskNotFound,

    #[error("Error: source disk not found")]
    SourceDiskNotFound,

    #[error("Error: target file already exists")]
    TargetExists,

    #[error("Error: path already exists")]
    AlreadyExists,

    #[error("Directory not empty")]
    DirectoryNotEmpty,

    #[error("Invalid path")]
    InvalidPath,

    #[error("Error: invalid file mode ({0})")]
    InvalidMode(String),

    #[error("Error: path escapes disk ({0})")]
    EscapesDisk(String),

    #[error("file is not open")]
    NotOpen,

    #[error("Error: file not open for reading")]
    NotReadable,

    #[error("Error: file not open for writing")]
    NotWritable,

    #[error("Error: {0}")]
    Io(String),
}

impl Error {
    /// True for errors that mean the caller built a bad path or mode
    /// string, as opposed to an ordinary runtime condition.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidMode(_) | Error::EscapesDisk(_) | Error::InvalidPath
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound,
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists,
            std::io::ErrorKind::DirectoryNotEmpty => Error::DirectoryNotEmpty,
            _ => Error::Io(err.to_string()),
        }
    }
}
