// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-process replication between a host and one peer.
//!
//! The host keeps the peer's private `usr` disk and the shared `net` disk
//! on the local filesystem under `<home>/demo`. The peer mounts memory
//! replicas of both, runs a few shell commands against them, and the
//! changes flow back to the host's directories.

use anyhow::{Context, Result};
use diagnostics::log_info;
use diskfs::{Disk, DiskRegistry, MemoryDirectoryTree, MemoryDisk, RealDisk, SharedRealDisk, Visibility};
use replication::{HOST_ID, HostReplicator, Inbox, LocalNetwork, Outbox, PeerId, PeerReplicator};
use shell::Shell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use super::shell::run_lines;
use crate::common::{Workspace, format_file_size};

/// Identity given to the simulated peer
pub const DEMO_PEER: PeerId = 1;

const SCRIPT: [&str; 3] = [
    "file_write \"/usr/notes.txt\", \"written on the peer\"",
    "file_write \"/net/board.txt\", \"hello from \" + str(1)",
    "print file_list(\"/usr\")",
];

struct Demo {
    net: LocalNetwork,
    host: HostReplicator,
    host_inbox: Inbox,
    peer: PeerReplicator,
    peer_inbox: Inbox,
}

impl Demo {
    fn build(root: &Path) -> Result<Self> {
        let mut net = LocalNetwork::new();
        let host_inbox = net.join(HOST_ID);
        let host_outbox = Rc::new(Outbox::new(HOST_ID));

        let shared_root = root.join("net");
        let usr_root = root.join(format!("participants/{DEMO_PEER}/usr"));
        for dir in [&shared_root, &usr_root] {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let startup = usr_root.join("startup.ms");
        if !startup.exists() {
            std::fs::write(&startup, "print \"hello from the host\"\n")?;
        }

        let shared: Rc<dyn Disk> = Rc::new(SharedRealDisk::new(
            "net",
            &shared_root,
            Visibility::Shared,
            host_outbox.clone(),
        )?);
        let on_host = DiskRegistry::new(DEMO_PEER, system_disk());
        on_host.mount(Rc::new(RealDisk::new("usr", &usr_root, true)?))?;
        on_host.mount(shared)?;

        let mut host = HostReplicator::new(host_outbox);
        host.add_participant(DEMO_PEER, Rc::new(on_host));

        let peer_inbox = net.join(DEMO_PEER);
        let peer = PeerReplicator::new(
            Rc::new(DiskRegistry::new(DEMO_PEER, system_disk())),
            Rc::new(Outbox::new(DEMO_PEER)),
        );
        _ = peer.mount_replicated("usr", Visibility::Private)?;
        _ = peer.mount_replicated("net", Visibility::Shared)?;

        Ok(Self {
            net,
            host,
            host_inbox,
            peer,
            peer_inbox,
        })
    }

    /// Deliver messages until both sides are quiet
    fn settle(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            let moved = self.net.flush(self.host.outbox())? + self.net.flush(self.peer.outbox())?;
            for envelope in self.host_inbox.drain() {
                self.host.handle(envelope)?;
            }
            for envelope in self.peer_inbox.drain() {
                self.peer.handle(envelope)?;
            }
            if moved == 0 {
                return Ok(total);
            }
            total += moved;
        }
    }
}

fn system_disk() -> Rc<dyn Disk> {
    Rc::new(MemoryDisk::with_tree("sys", MemoryDirectoryTree::new(), false))
}

pub fn replicate_demo(workspace: &Workspace, out: &mut impl Write) -> Result<()> {
    let root = workspace.home.join("demo");
    let mut demo = Demo::build(&root)?;

    let synced = demo.settle()?;
    log_info!("initial sync delivered {synced} messages", synced);
    writeln!(out, "peer {DEMO_PEER} hydrated:")?;
    for disk in ["usr", "net"] {
        let names = demo.peer.registry().list(&format!("/{disk}")).unwrap_or_default();
        writeln!(out, "  /{disk}: {}", names.join(", "))?;
    }

    let mut shell = Shell::new(workspace.config.shell.clone(), demo.peer.registry().clone());
    run_lines(&mut shell, SCRIPT, out)?;

    let updates = demo.settle()?;
    log_info!("peer updates delivered {updates} messages", updates);
    writeln!(out, "host copies after {updates} updates:")?;
    let files = [
        "net/board.txt".to_string(),
        format!("participants/{DEMO_PEER}/usr/notes.txt"),
    ];
    for file in &files {
        let path = root.join(file);
        let size = std::fs::metadata(&path)
            .with_context(|| format!("{} was not replicated", path.display()))?
            .len();
        writeln!(out, "  {file} ({})", format_file_size(size))?;
    }
    Ok(())
}
