//! Interpretation of client commands against the ledger.

use crate::{auditor, broadcast::BroadcastBus, ledger::Ledger};
use kassenbuch_api::{Command, Error, ServerMessage};
use std::sync::Arc;

/// What a session has to do after a command was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send this message to the issuing session only.
    Reply(ServerMessage),
    /// A notice was queued for every session; nothing to reply.
    Published,
    /// End the session.
    Disconnect,
}

/// Dispatches protocol lines to the `Ledger` and the auditor.
///
/// ```
/// use kassenbuch::{
///     broadcast::BroadcastBus, config::LedgerConfig, dispatcher::Outcome, CommandDispatcher,
///     ConnectionRegistry, Ledger,
/// };
/// use std::sync::Arc;
///
/// let registry = Arc::new(ConnectionRegistry::new());
/// let (bus, _worker) = BroadcastBus::new(registry);
/// let ledger = Arc::new(Ledger::new(LedgerConfig::default()));
/// let dispatcher = CommandDispatcher::new(ledger.clone(), Arc::new(bus));
///
/// assert_eq!(dispatcher.dispatch("3"), Outcome::Published);
/// assert_eq!(dispatcher.dispatch("5"), Outcome::Disconnect);
/// assert!(matches!(dispatcher.dispatch("2:a:b:zero"), Outcome::Reply(_)));
/// assert_eq!(ledger.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    ledger: Arc<Ledger>,
    bus: Arc<BroadcastBus>,
}

impl CommandDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, bus: Arc<BroadcastBus>) -> Self {
        Self { ledger, bus }
    }

    /// The ledger this dispatcher works on.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Parse and execute a protocol line.
    ///
    /// Protocol and validation errors become an error reply; they never end the session.
    #[must_use]
    pub fn dispatch(&self, line: &str) -> Outcome {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(err) => reject(&err),
        }
    }

    /// Execute an already parsed command.
    #[must_use]
    pub fn execute(&self, command: Command) -> Outcome {
        log::debug!("Dispatching {:?}", command);
        match command {
            Command::ShowLedger => {
                Outcome::Reply(ServerMessage::Ledger(self.ledger.snapshot().into_iter().collect()))
            }
            Command::Transfer { from, to, amount } => {
                let result = self.ledger.append(&from, &to, &amount, |block| {
                    self.bus.publish(ServerMessage::NewBlock(block.clone()));
                });
                match result {
                    Ok(_) => Outcome::Published,
                    Err(err) => reject(&err),
                }
            }
            Command::Mine => {
                self.ledger.mine(|block| {
                    self.bus.publish(ServerMessage::MinedBlock(block.clone()));
                });
                Outcome::Published
            }
            Command::Audit => {
                let snapshot = self.ledger.snapshot();
                let report = auditor::audit(&snapshot, self.ledger.reserved_accounts());
                Outcome::Reply(ServerMessage::Audit(report))
            }
            Command::Disconnect => Outcome::Disconnect,
        }
    }
}

fn reject(err: &Error) -> Outcome {
    log::debug!("Rejected request: {}", err);
    Outcome::Reply(ServerMessage::error(err))
}
