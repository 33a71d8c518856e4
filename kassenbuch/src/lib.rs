#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::doc_markdown
)]

//! Ein Kassenbuch für viele Kassen - **a minimal networked hash-chained ledger**
//!
//! ## Overview
//!
//! `Kassenbuch` keeps one authoritative, append-only chain of transfer records. Every block
//! carries the hash of its predecessor, so tampering with history is detectable.
//! Clients talk a newline-delimited text protocol over TCP: they can read the ledger, append
//! transfers, mine reward blocks and request an audit of all account balances.
//! New blocks are pushed to every connected client.
//!
//! The wire types live in [`kassenbuch_api`](../kassenbuch_api/index.html).

pub mod auditor;
pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod ledger;
pub mod outbox;
pub mod registry;
pub mod server;
pub mod session;
pub mod thread_group;

mod error;

pub use config::Config;
pub use dispatcher::CommandDispatcher;
pub use error::Error;
pub use ledger::Ledger;
pub use registry::ConnectionRegistry;
pub use server::{Server, ShutdownHandle};
pub use session::ClientSession;
