// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::message::{Envelope, Message, PeerId, Recipient, UpdateOp};
use diagnostics::log_debug;
use diskfs::{Change, ChangeSink, Visibility};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Messages one participant has queued for the network.
///
/// Replicated disks publish into it as their change sink; the tick driver
/// drains it and hands the envelopes to the transport.
#[derive(Debug)]
pub struct Outbox {
    owner: PeerId,
    queue: RefCell<VecDeque<Envelope>>,
}

impl Outbox {
    #[must_use]
    pub fn new(owner: PeerId) -> Self {
        Self {
            owner,
            queue: RefCell::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn owner(&self) -> PeerId {
        self.owner
    }

    pub fn send(&self, to: Recipient, message: Message) {
        log_debug!(
            "queue {kind} for {disk} from {from} to {to}",
            kind: message.kind(),
            disk: message.disk_name(),
            from: self.owner,
            to: format!("{:?}", to)
        );
        self.queue.borrow_mut().push_back(Envelope {
            from: self.owner,
            to,
            message,
        });
    }

    /// Take everything queued so far, oldest first
    pub fn drain(&self) -> Vec<Envelope> {
        self.queue.borrow_mut().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl ChangeSink for Outbox {
    fn publish(&self, change: Change) {
        let to = match change.visibility {
            Visibility::Private => Recipient::Host,
            Visibility::Shared => Recipient::All,
        };
        self.send(
            to,
            Message::Update(UpdateOp {
                disk_name: change.disk_name,
                path: change.path,
                action: change.action,
            }),
        );
    }
}
