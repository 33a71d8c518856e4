//! The set of live sessions, used as broadcast targets.

use crate::outbox::Outbox;
use kassenbuch_api::BlockNumber;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

/// Identifies a registered session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered session as seen by the broadcaster.
#[derive(Debug, Clone)]
pub struct Member {
    /// The session's id.
    pub id: SessionId,
    /// The last block contained in the ledger dump the session got when it registered.
    pub synced_to: BlockNumber,
    /// The session's output path.
    pub outbox: Outbox,
}

impl Member {
    /// Whether the session still has to be told about block `index`.
    #[must_use]
    pub fn awaits(&self, index: BlockNumber) -> bool {
        index > self.synced_to
    }
}

/// The registry of live sessions.
///
/// Membership only changes when a session starts or ends. It never affects the ledger.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<State>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Member>,
    closed: bool,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session's output path and return its id.
    ///
    /// `synced_to` is the last block the session already knows about; notices for it and
    /// every earlier block are not delivered to this session.
    /// Returns `None` once the registry was closed by [`close_all`](#method.close_all).
    pub fn register(&self, outbox: Outbox, synced_to: BlockNumber) -> Option<SessionId> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "Registered session {} ({}) at block #{}.",
            id,
            outbox.peer_addr(),
            synced_to
        );
        state.sessions.insert(
            id,
            Member {
                id,
                synced_to,
                outbox,
            },
        );
        Some(id)
    }

    /// Remove a session. Removing an unknown session is a no-op.
    ///
    /// Returns whether the session was registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.state.lock().unwrap().sessions.remove(&id).is_some();
        if removed {
            log::debug!("Unregistered session {}.", id);
        }
        removed
    }

    /// A copy of all registered sessions.
    ///
    /// Fan-out writes happen on this copy, never while the registry lock is held.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .values()
            .cloned()
            .collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse new registrations and close every live connection.
    ///
    /// The sessions unregister themselves when their loops end.
    pub fn close_all(&self) {
        let members = {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            state.sessions.values().cloned().collect::<Vec<_>>()
        };
        for member in members {
            log::debug!(
                "Closing session {} ({}).",
                member.id,
                member.outbox.peer_addr()
            );
            member.outbox.close();
        }
    }
}
