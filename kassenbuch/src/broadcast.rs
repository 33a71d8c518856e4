//! Fan-out of server messages to every live session.

use crate::registry::ConnectionRegistry;
use kassenbuch_api::ServerMessage;
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc, Mutex,
};

/// A broadcaster for ledger notices.
///
/// [`publish`](#method.publish) only enqueues, so it can be called while the ledger lock is held:
/// notices leave in ledger order, and the network writes happen on the
/// [`BroadcastWorker`](struct.BroadcastWorker.html) thread after the lock is released.
#[derive(Debug)]
pub struct BroadcastBus {
    registry: Arc<ConnectionRegistry>,
    sender: Mutex<Option<Sender<ServerMessage>>>,
}

impl BroadcastBus {
    /// Create a new bus delivering to the sessions in `registry`.
    ///
    /// The returned worker has to be run on its own thread.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> (Self, BroadcastWorker) {
        let (sender, receiver) = mpsc::channel();
        let bus = Self {
            registry: registry.clone(),
            sender: Mutex::new(Some(sender)),
        };
        let worker = BroadcastWorker { registry, receiver };
        (bus, worker)
    }

    /// Queue `message` for delivery to all sessions registered when it is delivered
    /// that do not know its block yet.
    pub fn publish(&self, message: ServerMessage) {
        let sender = self.sender.lock().unwrap();
        match &*sender {
            Some(sender) => {
                if sender.send(message).is_err() {
                    log::error!("Broadcast worker is gone, dropping message.");
                }
            }
            None => log::warn!("Broadcast bus is closed, dropping message."),
        }
    }

    /// Deliver `message` to every registered session right now, bypassing the queue.
    ///
    /// Returns the number of sessions the message was written to.
    pub fn deliver(&self, message: &ServerMessage) -> usize {
        deliver(&self.registry, message)
    }

    /// Stop accepting messages. The worker ends after delivering everything already queued.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }
}

/// The thread side of a [`BroadcastBus`](struct.BroadcastBus.html).
#[derive(Debug)]
pub struct BroadcastWorker {
    registry: Arc<ConnectionRegistry>,
    receiver: Receiver<ServerMessage>,
}

impl BroadcastWorker {
    /// Deliver queued messages until the bus is closed.
    ///
    /// Returns the number of messages broadcast.
    pub fn run(self) -> usize {
        let mut messages = 0;
        for message in self.receiver {
            deliver(&self.registry, &message);
            messages += 1;
        }
        messages
    }
}

/// Block notices skip sessions whose ledger dump already contains the block.
/// A session whose write fails is closed; it unregisters itself when its read loop ends.
fn deliver(registry: &ConnectionRegistry, message: &ServerMessage) -> usize {
    let members = registry.members();
    let mut delivered = 0;
    for member in &members {
        if let Some(block) = message.block() {
            if !member.awaits(block.index()) {
                log::trace!(
                    "Session {} already has block #{}.",
                    member.id,
                    block.index()
                );
                continue;
            }
        }
        match member.outbox.send(message) {
            Ok(()) => delivered += 1,
            Err(err) => {
                log::warn!(
                    "Error while broadcasting to session {} ({}), closing it: {}",
                    member.id,
                    member.outbox.peer_addr(),
                    err
                );
                member.outbox.close();
            }
        }
    }
    log::trace!(
        "Broadcast delivered to {} of {} sessions.",
        delivered,
        members.len()
    );
    delivered
}
