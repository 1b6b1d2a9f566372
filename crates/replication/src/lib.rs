// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Replication of memory-backed disks between a host and its peers.
//!
//! A peer's fresh memory disk asks the host for a full tree, then every
//! local mutation travels as an incremental update: private disks to the
//! host only, shared disks to everyone.

pub mod error;
pub mod host;
pub mod message;
pub mod network;
pub mod outbox;
pub mod peer;

pub use error::{ReplicationError, Result};
pub use host::HostReplicator;
pub use message::{Envelope, HOST_ID, Message, PeerId, Recipient, UpdateOp};
pub use network::{Inbox, LocalNetwork};
pub use outbox::Outbox;
pub use peer::PeerReplicator;
