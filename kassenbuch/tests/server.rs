use kassenbuch::{
    config::Config, ledger::verify_chain, ConnectionRegistry, Ledger, Server, ShutdownHandle,
};
use kassenbuch_api::{Block, Client, Command, ErrorKind, ServerMessage};
use rust_decimal::Decimal;
use std::{
    io::{BufReader, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

struct TestServer {
    addr: SocketAddr,
    ledger: Arc<Ledger>,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<Result<(), kassenbuch::Error>>>,
}

impl TestServer {
    fn start() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let _ = pretty_env_logger::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(config);
        let ledger = server.ledger().clone();
        let registry = server.registry().clone();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.serve(&listener));

        Self {
            addr,
            ledger,
            registry,
            shutdown,
            thread: Some(thread),
        }
    }

    /// Connect and consume the initial ledger dump.
    fn connect(&self) -> (Client, Vec<Block>) {
        let mut client = Client::connect(self.addr).unwrap();
        match client.receive().unwrap() {
            Some(ServerMessage::Ledger(blocks)) => (client, blocks),
            other => panic!("expected a ledger dump, got {:?}", other),
        }
    }

    fn stop(mut self) -> Result<(), kassenbuch::Error> {
        self.shutdown.shutdown();
        self.thread.take().unwrap().join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shutdown.shutdown();
            let _ = thread.join();
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

fn expect_new_block(client: &mut Client) -> Block {
    match client.receive().unwrap() {
        Some(ServerMessage::NewBlock(block)) => block,
        other => panic!("expected a new block notice, got {:?}", other),
    }
}

fn expect_error(client: &mut Client, line: &str) -> ErrorKind {
    client.send_line(line).unwrap();
    match client.receive().unwrap() {
        Some(ServerMessage::Error { kind, .. }) => kind,
        other => panic!("expected an error reply to {:?}, got {:?}", line, other),
    }
}

fn request_ledger(client: &mut Client) -> Vec<Block> {
    match client.request(&Command::ShowLedger, |_| {}).unwrap() {
        Some(ServerMessage::Ledger(blocks)) => blocks,
        other => panic!("expected a ledger dump, got {:?}", other),
    }
}

#[test]
fn ledger_dump_on_connect() {
    let server = TestServer::start();
    let (_client, blocks) = server.connect();

    assert_eq!(blocks.len(), 1);
    assert_eq!(u64::from(blocks[0].index()), 0);
    assert_eq!(blocks[0].previous_hash().as_str(), "0");
    assert_eq!(&blocks[0], &server.ledger.tail());
    assert!(blocks[0].verify());
}

#[test]
fn transfers_are_broadcast_to_every_session() {
    let server = TestServer::start();
    let mut clients: Vec<_> = (0..3).map(|_| server.connect().0).collect();
    assert_eq!(server.registry.len(), 3);

    clients[0].send_line("2:A:B:30").unwrap();
    for client in &mut clients {
        let block = expect_new_block(client);
        assert_eq!(u64::from(block.index()), 1);
        assert_eq!(block.from(), "A");
        assert_eq!(block.to(), "B");
        assert_eq!(block.amount().as_str(), "30");
        assert!(block.verify());
    }

    // No session got the notice twice: the next message is the reply.
    for client in &mut clients {
        client.send(&Command::ShowLedger).unwrap();
        match client.receive().unwrap() {
            Some(ServerMessage::Ledger(blocks)) => assert_eq!(blocks.len(), 2),
            other => panic!("expected a ledger dump, got {:?}", other),
        }
    }
}

#[test]
fn mined_blocks_are_broadcast() {
    let server = TestServer::start();
    let (mut miner, _) = server.connect();
    let (mut observer, _) = server.connect();

    miner.send(&Command::Mine).unwrap();
    for client in &mut [&mut miner, &mut observer] {
        match client.receive().unwrap() {
            Some(ServerMessage::MinedBlock(block)) => {
                assert_eq!(block.from(), "MINER");
                assert_eq!(block.to(), "MINER_REWARD");
                assert_eq!(block.amount().as_str(), "50");
            }
            other => panic!("expected a mined block notice, got {:?}", other),
        }
    }
}

#[test]
fn later_sessions_see_earlier_blocks_in_their_dump() {
    let server = TestServer::start();
    let (mut first, _) = server.connect();
    first.send_line("2:A:B:5").unwrap();
    let block = expect_new_block(&mut first);

    let (_second, blocks) = server.connect();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1], block);
}

#[test]
fn disconnected_sessions_receive_nothing() {
    let server = TestServer::start();
    let (mut staying, _) = server.connect();
    let (mut leaving, _) = server.connect();
    assert_eq!(server.registry.len(), 2);

    leaving.send(&Command::Disconnect).unwrap();
    assert!(leaving.receive().unwrap().is_none());
    wait_until(|| server.registry.len() == 1);

    staying.send(&Command::Mine).unwrap();
    assert!(matches!(
        staying.receive().unwrap(),
        Some(ServerMessage::MinedBlock(_))
    ));
    assert!(leaving.receive().unwrap().is_none());
}

#[test]
fn stalled_sessions_are_dropped_without_blocking_others() {
    let mut config = Config::default();
    config.write_timeout_ms = 200;
    config.max_line_length = 1_000_000;
    let server = TestServer::with_config(config);

    let (mut active, _) = server.connect();
    // Never reads, so its socket buffers fill up.
    let stalled = TcpStream::connect(server.addr).unwrap();
    wait_until(|| server.registry.len() == 2);

    let sender = "S".repeat(500_000);
    for number in 1..=60 {
        active
            .send_line(&format!("2:{}:B:1", sender))
            .unwrap();
        let block = expect_new_block(&mut active);
        assert_eq!(u64::from(block.index()), number);
    }

    wait_until(|| server.registry.len() == 1);
    active.send(&Command::Mine).unwrap();
    assert!(matches!(
        active.receive().unwrap(),
        Some(ServerMessage::MinedBlock(_))
    ));
    drop(stalled);
}

#[test]
fn reserved_accounts_may_send() {
    let server = TestServer::start();
    let (mut client, _) = server.connect();

    client.send_line("2:Genesis:X:100").unwrap();
    let block = expect_new_block(&mut client);
    assert_eq!(block.from(), "Genesis");

    match client.request(&Command::Audit, |_| {}).unwrap() {
        Some(ServerMessage::Audit(report)) => {
            assert_eq!(report.balance("X"), Some(Decimal::from(100)));
            assert!(!report.has_double_spend());
        }
        other => panic!("expected an audit report, got {:?}", other),
    }
}

#[test]
fn closing_the_connection_ends_the_session() {
    let server = TestServer::start();
    let (client, _) = server.connect();
    assert_eq!(server.registry.len(), 1);

    drop(client);
    wait_until(|| server.registry.is_empty());

    let (client, _) = server.connect();
    client.disconnect().unwrap();
    wait_until(|| server.registry.is_empty());
}

#[test]
fn errors_keep_the_session_alive() {
    let server = TestServer::start();
    let (mut client, _) = server.connect();

    assert_eq!(expect_error(&mut client, "9"), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, ""), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, "2:A:B"), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, "2:A:B:30:40"), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, "1:extra"), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, "2:A:B::"), ErrorKind::Protocol);
    assert_eq!(expect_error(&mut client, "2:A:B:abc"), ErrorKind::Validation);
    assert_eq!(expect_error(&mut client, "2:A:B:-5"), ErrorKind::Validation);
    assert_eq!(expect_error(&mut client, "2:A:B:0"), ErrorKind::Validation);

    assert_eq!(request_ledger(&mut client).len(), 1);
    assert_eq!(server.ledger.len(), 1);
    assert_eq!(server.registry.len(), 1);
}

#[test]
fn rejected_transfers_are_not_broadcast() {
    let server = TestServer::start();
    let (mut sender, _) = server.connect();
    let (mut observer, _) = server.connect();

    assert_eq!(expect_error(&mut sender, "2:A:B:zero"), ErrorKind::Validation);
    sender.send_line("2:A:B:1").unwrap();
    let block = expect_new_block(&mut observer);
    assert_eq!(u64::from(block.index()), 1);
    assert_eq!(expect_new_block(&mut sender), block);
}

#[test]
fn oversized_and_binary_lines_are_rejected() {
    let mut config = Config::default();
    config.max_line_length = 32;
    let server = TestServer::with_config(config);

    let mut stream = TcpStream::connect(server.addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    assert!(matches!(
        ServerMessage::read_from(&mut reader).unwrap(),
        Some(ServerMessage::Ledger(_))
    ));

    let mut long_line = "2:A:B:".to_string();
    long_line.push_str(&"1".repeat(100));
    long_line.push('\n');
    stream.write_all(long_line.as_bytes()).unwrap();
    stream.write_all(b"2:\xff\xfe:B:1\n").unwrap();
    stream.write_all(b"4\r\n").unwrap();

    for expected in &[ErrorKind::Protocol, ErrorKind::Protocol] {
        match ServerMessage::read_from(&mut reader).unwrap() {
            Some(ServerMessage::Error { kind, .. }) => assert_eq!(kind, *expected),
            other => panic!("expected an error reply, got {:?}", other),
        }
    }
    assert!(matches!(
        ServerMessage::read_from(&mut reader).unwrap(),
        Some(ServerMessage::Audit(_))
    ));
    assert_eq!(server.ledger.len(), 1);
}

#[test]
fn audit_over_the_wire() {
    let server = TestServer::start();
    let (mut client, _) = server.connect();

    for line in &["2:A:B:30", "2:B:C:10"] {
        client.send_line(line).unwrap();
        expect_new_block(&mut client);
    }
    client.send(&Command::Mine).unwrap();
    assert!(matches!(
        client.receive().unwrap(),
        Some(ServerMessage::MinedBlock(_))
    ));

    let report = match client.request(&Command::Audit, |_| {}).unwrap() {
        Some(ServerMessage::Audit(report)) => report,
        other => panic!("expected an audit report, got {:?}", other),
    };
    assert_eq!(report.balance("A"), Some(Decimal::from(-30)));
    assert_eq!(report.balance("B"), Some(Decimal::from(20)));
    assert_eq!(report.balance("C"), Some(Decimal::from(10)));
    assert_eq!(report.balance("MINER_REWARD"), Some(Decimal::from(50)));
    assert_eq!(report.balance("MINER"), None);
    assert_eq!(
        report.double_spenders.iter().collect::<Vec<_>>(),
        vec!["A"]
    );

    // Nothing changed in between, so the second audit is identical.
    match client.request(&Command::Audit, |_| {}).unwrap() {
        Some(ServerMessage::Audit(again)) => assert_eq!(again, report),
        other => panic!("expected an audit report, got {:?}", other),
    }
}

#[test]
fn concurrent_clients_build_one_chain() {
    const CLIENTS: usize = 6;
    const TRANSFERS: usize = 20;

    let server = TestServer::start();
    let addr = server.addr;
    let handles: Vec<_> = (0..CLIENTS)
        .map(|number| {
            thread::spawn(move || {
                let mut client = Client::connect(addr).unwrap();
                for _ in 0..TRANSFERS {
                    if number % 3 == 0 {
                        client.send(&Command::Mine).unwrap();
                    } else {
                        client.send_line(&format!("2:c{}:sink:1", number)).unwrap();
                    }
                }
                client.send(&Command::Disconnect).unwrap();
                // Drain dump and notices until the server closes the connection.
                while let Ok(Some(_)) = client.receive() {}
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = server.ledger.snapshot();
    assert_eq!(snapshot.len(), 1 + CLIENTS * TRANSFERS);
    assert_eq!(verify_chain(&snapshot), Ok(()));

    let (mut client, blocks) = server.connect();
    assert_eq!(blocks, snapshot.iter().cloned().collect::<Vec<_>>());
    assert_eq!(request_ledger(&mut client), blocks);
}

#[test]
fn surplus_connections_wait_for_a_worker() {
    let mut config = Config::default();
    config.workers = 1;
    let server = TestServer::with_config(config);

    let (busy, _) = server.connect();
    let mut waiting = Client::connect(server.addr).unwrap();
    waiting
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    assert!(waiting.receive().is_err());

    busy.disconnect().unwrap();
    waiting.set_read_timeout(None).unwrap();
    assert!(matches!(
        waiting.receive().unwrap(),
        Some(ServerMessage::Ledger(_))
    ));
}

#[test]
fn shutdown_disconnects_every_session() {
    let server = TestServer::start();
    let (mut first, _) = server.connect();
    let (mut second, _) = server.connect();
    let registry = server.registry.clone();

    server.stop().unwrap();
    assert!(registry.is_empty());
    for client in &mut [&mut first, &mut second] {
        assert!(!matches!(client.receive(), Ok(Some(_))));
    }
}
