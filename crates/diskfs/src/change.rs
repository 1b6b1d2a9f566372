// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Mutation records published by replicated disks.
//!
//! Disks only know that *something* wants to hear about their writes; the
//! replication crate decides who receives them.

use diagnostics::log_debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// What happened at a path
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    Write(Vec<u8>),
    MakeDir,
    Delete,
}

impl fmt::Debug for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAction::Write(data) => write!(f, "Write({} bytes)", data.len()),
            UpdateAction::MakeDir => write!(f, "MakeDir"),
            UpdateAction::Delete => write!(f, "Delete"),
        }
    }
}

/// Who a disk's changes are meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// One participant's own disk; only the host keeps a copy
    Private,
    /// Broadcast to every participant
    Shared,
}

/// One successful mutation on a replicated disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub disk_name: String,
    pub visibility: Visibility,
    pub path: String,
    pub action: UpdateAction,
}

/// Receiver of local mutations
pub trait ChangeSink {
    fn publish(&self, change: Change);
}

/// A disk's connection to its change sink
#[derive(Clone)]
pub struct ReplicaLink {
    disk_name: String,
    visibility: Visibility,
    sink: Rc<dyn ChangeSink>,
}

impl ReplicaLink {
    pub fn new(disk_name: impl Into<String>, visibility: Visibility, sink: Rc<dyn ChangeSink>) -> Self {
        Self {
            disk_name: disk_name.into(),
            visibility,
            sink,
        }
    }

    #[must_use]
    pub fn disk_name(&self) -> &str {
        &self.disk_name
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn emit(&self, path: &str, action: UpdateAction) {
        log_debug!(
            "replicating {disk}:{path} {action}",
            disk: self.disk_name.as_str(),
            path,
            action: format!("{:?}", action)
        );
        self.sink.publish(Change {
            disk_name: self.disk_name.clone(),
            visibility: self.visibility,
            path: path.to_string(),
            action,
        });
    }
}

impl fmt::Debug for ReplicaLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaLink")
            .field("disk_name", &self.disk_name)
            .field("visibility", &self.visibility)
            .finish()
    }
}

/// Sink that simply remembers what it was told
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: RefCell<Vec<Change>>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Change> {
        std::mem::take(&mut *self.changes.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.borrow().is_empty()
    }
}

impl ChangeSink for ChangeLog {
    fn publish(&self, change: Change) {
        self.changes.borrow_mut().push(change);
    }
}
