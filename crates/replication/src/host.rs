// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The authoritative side of replication.
//!
//! The host keeps a real on-host copy of every participant's private disk
//! and owns the shared disks. It answers full-sync requests from those
//! copies and folds incoming updates into them without publishing again.

use crate::error::{ReplicationError, Result};
use crate::message::{Envelope, HOST_ID, Message, PeerId, Recipient, UpdateOp};
use crate::outbox::Outbox;
use diagnostics::{log_debug, log_info, log_warn};
use diskfs::{Disk, DiskRegistry, MemoryDirectoryTree};
use std::collections::BTreeMap;
use std::rc::Rc;

pub struct HostReplicator {
    outbox: Rc<Outbox>,
    participants: BTreeMap<PeerId, Rc<DiskRegistry>>,
}

impl HostReplicator {
    #[must_use]
    pub fn new(outbox: Rc<Outbox>) -> Self {
        Self {
            outbox,
            participants: BTreeMap::new(),
        }
    }

    /// Register the host-side registry holding `peer`'s disks
    pub fn add_participant(&mut self, peer: PeerId, registry: Rc<DiskRegistry>) {
        log_info!("host tracking participant {peer}", peer);
        _ = self.participants.insert(peer, registry);
    }

    pub fn remove_participant(&mut self, peer: PeerId) -> Option<Rc<DiskRegistry>> {
        self.participants.remove(&peer)
    }

    #[must_use]
    pub fn outbox(&self) -> &Rc<Outbox> {
        &self.outbox
    }

    fn disk_for(&self, peer: PeerId, disk_name: &str) -> Result<Rc<dyn Disk>> {
        let registry = self
            .participants
            .get(&peer)
            .ok_or(ReplicationError::UnknownParticipant(peer))?;
        registry
            .get(disk_name)
            .ok_or_else(|| ReplicationError::UnknownDisk(disk_name.to_string()))
    }

    /// Full content of a disk as the host sees it
    pub fn snapshot(&self, peer: PeerId, disk_name: &str) -> Result<MemoryDirectoryTree> {
        let disk = self.disk_for(peer, disk_name)?;
        if let Some(native) = disk.native_path("") {
            return Ok(MemoryDirectoryTree::snapshot(&native)?);
        }
        disk.as_memory_disk()
            .and_then(|memory| memory.snapshot())
            .ok_or_else(|| ReplicationError::NotSnapshottable(disk_name.to_string()))
    }

    /// Process one message addressed to the host
    pub fn handle(&self, envelope: Envelope) -> Result<()> {
        let from = envelope.from;
        match envelope.message {
            Message::SyncRequest { disk_name } => {
                let tree = self.snapshot(from, &disk_name)?;
                log_debug!(
                    "answering sync of {disk} for {peer} ({bytes} bytes)",
                    disk: disk_name.as_str(),
                    peer: from,
                    bytes: tree.total_size()
                );
                self.outbox
                    .send(Recipient::Peer(from), Message::SyncTree { disk_name, tree });
                Ok(())
            }
            Message::Update(op) => self.apply(from, &op),
            Message::SyncTree { .. } => {
                log_warn!("host ignoring SyncTree from {peer}", peer: from);
                Err(ReplicationError::Unexpected {
                    kind: "SyncTree",
                    from,
                })
            }
        }
    }

    fn apply(&self, from: PeerId, op: &UpdateOp) -> Result<()> {
        if from == HOST_ID {
            return Err(ReplicationError::Unexpected { kind: "Update", from });
        }
        let disk = self.disk_for(from, &op.disk_name)?;
        log_debug!(
            "host applying {disk}:{path} from {peer} without echo",
            disk: op.disk_name.as_str(),
            path: op.path.as_str(),
            peer: from
        );
        disk.apply_update(&op.path, &op.action).inspect_err(|err| {
            log_warn!(
                "update {disk}:{path} from {peer} rejected: {err}",
                disk: op.disk_name.as_str(),
                path: op.path.as_str(),
                peer: from,
                err: err.to_string().as_str()
            );
        })?;
        Ok(())
    }
}
