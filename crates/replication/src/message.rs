// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Wire messages and their JSON framing.

use crate::error::Result;
use diskfs::{MemoryDirectoryTree, UpdateAction};
use serde::{Deserialize, Serialize};

/// Stable participant identity
pub type PeerId = u64;

/// The authoritative participant
pub const HOST_ID: PeerId = 0;

/// One incremental mutation of a replicated disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub disk_name: String,
    pub path: String,
    pub action: UpdateAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// A peer asks for the full content of a disk
    SyncRequest { disk_name: String },
    /// The host's answer: the whole tree, replacing whatever the peer had
    SyncTree {
        disk_name: String,
        tree: MemoryDirectoryTree,
    },
    Update(UpdateOp),
}

impl Message {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::SyncRequest { .. } => "SyncRequest",
            Message::SyncTree { .. } => "SyncTree",
            Message::Update(_) => "Update",
        }
    }

    #[must_use]
    pub fn disk_name(&self) -> &str {
        match self {
            Message::SyncRequest { disk_name } | Message::SyncTree { disk_name, .. } => disk_name,
            Message::Update(op) => &op.disk_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Host,
    /// Everyone except the sender
    All,
    Peer(PeerId),
}

impl Recipient {
    /// Whether participant `id` should receive a message sent by `from`
    #[must_use]
    pub fn includes(&self, id: PeerId, from: PeerId) -> bool {
        match self {
            Recipient::Host => id == HOST_ID,
            Recipient::All => id != from,
            Recipient::Peer(peer) => *peer == id,
        }
    }
}

/// A message with its routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: PeerId,
    pub to: Recipient,
    pub message: Message,
}

impl Envelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}
