// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! diskfs - virtual disks for the vcomp shell
//!
//! Set VCOMP_LOG to control logging:
//! - VCOMP_LOG=off (default) - silent
//! - VCOMP_LOG=info - mounts and unmounts
//! - VCOMP_LOG=debug - every disk mutation and handle flush

/// Sentinel errors handed back to scripts
pub mod error;

/// File and directory metadata snapshots
pub mod metadata;

/// Virtual path normalization and splitting
pub mod path;

/// Recursive in-memory directory tree
pub mod tree;

/// Mutation records for replicated disks
pub mod change;

/// The `Disk` capability and its backends
pub mod disk;

/// Buffered, mode-constrained file handles
pub mod handle;

/// Per-participant routing table
pub mod registry;

/// Script-level file operations on the registry
mod ops;

pub use change::{Change, ChangeLog, ChangeSink, ReplicaLink, UpdateAction, Visibility};
pub use disk::{Disk, MemoryDisk, RealDisk, SharedRealDisk};
pub use error::{Error, Result};
pub use handle::{AccessMode, OpenFileHandle};
pub use metadata::FileMetadata;
pub use path::resolve_path;
pub use registry::{DiskRegistry, SYSTEM_DISK};
pub use tree::{MemoryDirectoryTree, MemoryFile};
