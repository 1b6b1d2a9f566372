// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one file or directory, regenerated on every mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Last modification time
    pub modified_at: DateTime<Utc>,

    /// Byte length for files, entry count for directories
    pub size: u64,

    /// Entry type
    pub is_directory: bool,

    /// Free-form note attached to the entry (empty when unset)
    #[serde(default)]
    pub comment: String,
}

impl FileMetadata {
    #[must_use]
    pub fn file(size: u64) -> Self {
        Self {
            modified_at: Utc::now(),
            size,
            is_directory: false,
            comment: String::new(),
        }
    }

    #[must_use]
    pub fn directory(entries: u64) -> Self {
        Self {
            modified_at: Utc::now(),
            size: entries,
            is_directory: true,
            comment: String::new(),
        }
    }

    /// Build from host filesystem metadata
    #[must_use]
    pub fn from_host(meta: &std::fs::Metadata) -> Self {
        let modified_at = meta
            .modified()
            .ok()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        Self {
            modified_at,
            size: if meta.is_dir() { 0 } else { meta.len() },
            is_directory: meta.is_dir(),
            comment: String::new(),
        }
    }

    /// Same entry ignoring the timestamp
    #[must_use]
    pub fn same_shape(&self, other: &FileMetadata) -> bool {
        self.size == other.size
            && self.is_directory == other.is_directory
            && self.comment == other.comment
    }
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self::directory(0)
    }
}
