//! The acceptor: hands every accepted connection to a worker as a `ClientSession`.

use crate::{
    broadcast::BroadcastBus,
    config::Config,
    dispatcher::CommandDispatcher,
    ledger::Ledger,
    registry::ConnectionRegistry,
    session::{ClientSession, SessionConfig},
    thread_group::ThreadGroup,
    Error,
};
use rayon::{Scope, ThreadPoolBuilder};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Bind a listening socket on `addr`.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })
}

/// A ledger server.
///
/// ```no_run
/// use kassenbuch::{config::Config, server, Server};
///
/// let config = Config::default();
/// let listener = server::bind(config.bind_address).unwrap();
/// let server = Server::new(config);
/// server.serve(&listener).unwrap();
/// ```
pub struct Server {
    config: Config,
    ledger: Arc<Ledger>,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Create a new server with a fresh ledger.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let ledger = Ledger::new(config.ledger.clone());
        Self {
            config,
            ledger: Arc::new(ledger),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: ShutdownHandle::default(),
        }
    }

    /// The ledger served by this server.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The live sessions.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// A handle to stop [`serve`](#method.serve) from another thread.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The main server loop.
    ///
    /// Sessions run on a pool of `workers` threads; connections accepted while every
    /// worker is busy wait for a free one. Returns after a shutdown was requested and
    /// every session ended, or with an error if accepting connections failed.
    pub fn serve(self, listener: &TcpListener) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;
        self.shutdown.listening_on(local_addr);
        log::info!("Server is now listening on {}", local_addr);

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|number| format!("worker-{}", number))
            .build()?;
        log::debug!("Started {} workers.", pool.current_num_threads());

        let (bus, broadcast_worker) = BroadcastBus::new(self.registry.clone());
        let bus = Arc::new(bus);
        let mut broadcaster = ThreadGroup::new();
        broadcaster.spawn("broadcaster", move || broadcast_worker.run())?;
        let dispatcher = CommandDispatcher::new(self.ledger.clone(), bus.clone());

        // The scope returns once every spawned session ended.
        let result = pool.in_place_scope(|scope| {
            let result = self.accept(listener, scope, &dispatcher);
            if let Err(err) = &result {
                log::error!("Acceptor failed: {}", err);
            }
            log::info!("Shutting down: closing {} sessions.", self.registry.len());
            self.registry.close_all();
            result
        });

        bus.close();
        broadcaster.join_and_log();
        log::info!(
            "Server stopped with {} blocks in the ledger.",
            self.ledger.len()
        );
        result
    }

    fn accept<'scope>(
        &self,
        listener: &TcpListener,
        scope: &Scope<'scope>,
        dispatcher: &CommandDispatcher,
    ) -> Result<(), Error> {
        let session_config = SessionConfig {
            max_line_length: self.config.max_line_length,
            write_timeout: self.config.write_timeout(),
        };

        while !self.shutdown.is_shutdown() {
            let accepted = listener.accept();
            if self.shutdown.is_shutdown() {
                break;
            }
            let stream = match accepted {
                Ok((stream, _)) => stream,
                Err(err) if err.kind() == io::ErrorKind::ConnectionAborted => {
                    log::warn!("Connection aborted before it was accepted: {}", err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let session = match ClientSession::new(
                stream,
                dispatcher.clone(),
                self.registry.clone(),
                session_config,
            ) {
                Ok(session) => session,
                Err(err) => {
                    log::warn!("Could not set up session: {}", err);
                    continue;
                }
            };

            let peer_addr = session.peer_addr();
            log::info!("Connected: {}", peer_addr);
            scope.spawn(move |_| serve_session(session, peer_addr));
        }
        Ok(())
    }
}

/// Run one session to its end. A panicking session must not tear down the scope of all others.
fn serve_session(session: ClientSession, peer_addr: SocketAddr) {
    match panic::catch_unwind(AssertUnwindSafe(|| session.run())) {
        Ok(Ok(())) => log::info!("Disconnected: {}", peer_addr),
        Ok(Err(err)) => log::warn!("Session with {} ended: {}", peer_addr, err),
        Err(_) => log::error!("Session with {} panicked.", peer_addr),
    }
}

/// Stops a running [`Server`](struct.Server.html).
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl ShutdownHandle {
    /// Request the server to stop.
    ///
    /// The acceptor stops, live sessions are disconnected and the server's
    /// `serve` returns once all of them ended.
    pub fn shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Shutdown requested.");

        let wake_addr = *self.wake_addr.lock().unwrap();
        if let Some(addr) = wake_addr {
            // Unblocks the pending `accept`.
            if let Err(err) = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT) {
                log::debug!("Could not wake the acceptor on {}: {}", addr, err);
            }
        }
    }

    /// Whether a shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn listening_on(&self, mut addr: SocketAddr) {
        match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(Ipv6Addr::LOCALHOST.into()),
            _ => {}
        }
        *self.wake_addr.lock().unwrap() = Some(addr);
    }
}
