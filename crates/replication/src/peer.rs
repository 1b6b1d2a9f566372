// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ReplicationError, Result};
use crate::message::{Envelope, Message, PeerId, Recipient};
use crate::outbox::Outbox;
use diagnostics::{log_debug, log_warn};
use diskfs::{Disk, DiskRegistry, MemoryDisk, ReplicaLink, Visibility};
use std::rc::Rc;

/// The non-authoritative side of replication.
///
/// Mounts memory disks that stay empty until the host's full sync arrives,
/// and folds other participants' shared-disk updates in without echoing
/// them back out.
pub struct PeerReplicator {
    registry: Rc<DiskRegistry>,
    outbox: Rc<Outbox>,
}

impl PeerReplicator {
    #[must_use]
    pub fn new(registry: Rc<DiskRegistry>, outbox: Rc<Outbox>) -> Self {
        Self { registry, outbox }
    }

    #[must_use]
    pub fn id(&self) -> PeerId {
        self.outbox.owner()
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<DiskRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn outbox(&self) -> &Rc<Outbox> {
        &self.outbox
    }

    /// Mount a fresh replicated memory disk and ask the host to fill it
    pub fn mount_replicated(&self, name: &str, visibility: Visibility) -> Result<Rc<MemoryDisk>> {
        let link = ReplicaLink::new(name, visibility, self.outbox.clone());
        let disk = Rc::new(MemoryDisk::replicated(link));
        self.registry.mount(disk.clone())?;
        self.request_sync(name);
        Ok(disk)
    }

    pub fn request_sync(&self, disk_name: &str) {
        self.outbox.send(
            Recipient::Host,
            Message::SyncRequest {
                disk_name: disk_name.to_string(),
            },
        );
    }

    fn memory_disk(&self, disk_name: &str) -> Result<Rc<dyn Disk>> {
        let disk = self
            .registry
            .get(disk_name)
            .ok_or_else(|| ReplicationError::UnknownDisk(disk_name.to_string()))?;
        if disk.as_memory_disk().is_none() {
            return Err(ReplicationError::NotMemoryBacked(disk_name.to_string()));
        }
        Ok(disk)
    }

    /// Process one message addressed to this peer
    pub fn handle(&self, envelope: Envelope) -> Result<()> {
        let from = envelope.from;
        match envelope.message {
            Message::SyncTree { disk_name, tree } => {
                let disk = self.memory_disk(&disk_name)?;
                if let Some(memory) = disk.as_memory_disk() {
                    memory.install_tree(tree);
                }
                Ok(())
            }
            Message::Update(op) => {
                let disk = self.memory_disk(&op.disk_name)?;
                log_debug!(
                    "peer {me} applying {disk}:{path} from {peer} without echo",
                    me: self.id(),
                    disk: op.disk_name.as_str(),
                    path: op.path.as_str(),
                    peer: from
                );
                disk.apply_update(&op.path, &op.action)?;
                Ok(())
            }
            Message::SyncRequest { .. } => {
                log_warn!("peer {me} ignoring SyncRequest from {peer}", me: self.id(), peer: from);
                Err(ReplicationError::Unexpected {
                    kind: "SyncRequest",
                    from,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{HOST_ID, UpdateOp};
    use diskfs::{MemoryDirectoryTree, UpdateAction};

    fn peer(id: PeerId) -> PeerReplicator {
        let sys = Rc::new(MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), false));
        PeerReplicator::new(Rc::new(DiskRegistry::new(id, sys)), Rc::new(Outbox::new(id)))
    }

    fn sync_tree(tree: MemoryDirectoryTree) -> Envelope {
        Envelope {
            from: HOST_ID,
            to: Recipient::Peer(2),
            message: Message::SyncTree {
                disk_name: "usr".into(),
                tree,
            },
        }
    }

    #[test]
    fn test_fresh_disk_requests_sync() {
        let peer = peer(2);
        let disk = peer.mount_replicated("usr", Visibility::Private).unwrap();
        assert!(!disk.is_hydrated());
        let sent = peer.outbox().drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, Recipient::Host);
        assert_eq!(
            sent[0].message,
            Message::SyncRequest {
                disk_name: "usr".into()
            }
        );
    }

    #[test]
    fn test_sync_is_idempotent() {
        let peer = peer(2);
        let disk = peer.mount_replicated("usr", Visibility::Private).unwrap();
        let mut tree = MemoryDirectoryTree::new();
        assert!(tree.write(&["a.txt"], b"a"));

        peer.handle(sync_tree(tree.clone())).unwrap();
        let once = disk.snapshot().unwrap();
        peer.handle(sync_tree(tree.clone())).unwrap();
        let twice = disk.snapshot().unwrap();
        assert_eq!(once, twice);
        assert!(twice.content_eq(&tree));
    }

    #[test]
    fn test_remote_update_not_echoed() {
        let peer = peer(2);
        let net = peer.mount_replicated("net", Visibility::Shared).unwrap();
        _ = peer.outbox().drain();
        net.install_tree(MemoryDirectoryTree::new());
        peer.handle(Envelope {
            from: 3,
            to: Recipient::All,
            message: Message::Update(UpdateOp {
                disk_name: "net".into(),
                path: "hello.txt".into(),
                action: UpdateAction::Write(b"hi".to_vec()),
            }),
        })
        .unwrap();
        assert_eq!(net.read_text("hello.txt").as_deref(), Some("hi"));
        assert!(peer.outbox().is_empty());
    }

    #[test]
    fn test_sync_needs_memory_disk() {
        let peer = peer(2);
        assert!(matches!(
            peer.handle(sync_tree(MemoryDirectoryTree::new())),
            Err(ReplicationError::UnknownDisk(_))
        ));

        let home = tempfile::TempDir::new().unwrap();
        let real = diskfs::RealDisk::new("usr", home.path(), true).unwrap();
        peer.registry().mount(Rc::new(real)).unwrap();
        assert!(matches!(
            peer.handle(sync_tree(MemoryDirectoryTree::new())),
            Err(ReplicationError::NotMemoryBacked(_))
        ));
    }
}
