// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for disk replication

use crate::message::PeerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("Disk error: {0}")]
    Disk(#[from] diskfs::Error),

    #[error("Unknown disk: {0}")]
    UnknownDisk(String),

    #[error("Disk {0} is not memory-backed")]
    NotMemoryBacked(String),

    #[error("Disk {0} has no host storage to snapshot")]
    NotSnapshottable(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(PeerId),

    #[error("Channel to participant {0} is closed")]
    ChannelClosed(PeerId),

    #[error("Unexpected {kind} message from participant {from}")]
    Unexpected { kind: &'static str, from: PeerId },
}

pub type Result<T> = std::result::Result<T, ReplicationError>;
