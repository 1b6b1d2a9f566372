// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-process transport between participants.
//!
//! Each participant gets an unbounded channel of JSON frames. Delivery can
//! happen from any task; the receiving side drains its inbox on the tick
//! thread with `try_recv`, so disks are only touched from there.

use crate::error::{ReplicationError, Result};
use crate::message::{Envelope, PeerId};
use crate::outbox::Outbox;
use diagnostics::{log_debug, log_warn};
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

#[derive(Debug, Default, Clone)]
pub struct LocalNetwork {
    routes: BTreeMap<PeerId, UnboundedSender<String>>,
}

/// One participant's receiving end
#[derive(Debug)]
pub struct Inbox {
    id: PeerId,
    frames: UnboundedReceiver<String>,
}

impl LocalNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a participant; joining again replaces its previous inbox
    pub fn join(&mut self, id: PeerId) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        _ = self.routes.insert(id, tx);
        Inbox { id, frames: rx }
    }

    pub fn leave(&mut self, id: PeerId) {
        _ = self.routes.remove(&id);
    }

    #[must_use]
    pub fn participants(&self) -> Vec<PeerId> {
        self.routes.keys().copied().collect()
    }

    /// Encode once and hand the frame to every recipient; returns how many got it.
    ///
    /// A closed route does not stop delivery to the others; the first one
    /// is reported once everyone else has the frame.
    pub fn deliver(&self, envelope: &Envelope) -> Result<usize> {
        let frame = envelope.encode()?;
        let mut delivered = 0;
        let mut closed = None;
        for (id, route) in &self.routes {
            if !envelope.to.includes(*id, envelope.from) {
                continue;
            }
            if route.send(frame.clone()).is_err() {
                log_warn!("channel to participant {id} is closed", id: *id);
                _ = closed.get_or_insert(*id);
                continue;
            }
            delivered += 1;
        }
        if let Some(id) = closed {
            return Err(ReplicationError::ChannelClosed(id));
        }
        if delivered == 0 {
            log_warn!(
                "{kind} from {from} reached nobody",
                kind: envelope.message.kind(),
                from: envelope.from
            );
        }
        Ok(delivered)
    }

    /// Deliver everything queued in `outbox`.
    ///
    /// Every envelope is attempted; the first failure is returned after the
    /// rest have gone out.
    pub fn flush(&self, outbox: &Outbox) -> Result<usize> {
        let mut delivered = 0;
        let mut first_err = None;
        for envelope in outbox.drain() {
            match self.deliver(&envelope) {
                Ok(count) => delivered += count,
                Err(err) => {
                    _ = first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }
}

impl Inbox {
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Everything that has arrived so far, in arrival order.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut received = Vec::new();
        loop {
            match self.frames.try_recv() {
                Ok(frame) => match Envelope::decode(&frame) {
                    Ok(envelope) => received.push(envelope),
                    Err(err) => log_warn!(
                        "participant {id} dropped a bad frame: {err}",
                        id: self.id,
                        err: err.to_string().as_str()
                    ),
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if !received.is_empty() {
            log_debug!("participant {id} received {count} messages", id: self.id, count: received.len());
        }
        received
    }

    /// Wait for the next message
    pub async fn recv(&mut self) -> Option<Result<Envelope>> {
        let frame = self.frames.recv().await?;
        Some(Envelope::decode(&frame))
    }
}
