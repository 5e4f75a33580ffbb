//! Integration tests for the server, handler, and full connection flow
//! over loopback TCP.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use hearthgate::prelude::*;
use hearthgate_protocol::command::{client, server};
use hearthgate_protocol::{BinaryMessageCodec, FrameCodec, FrameReassembler, VerificationCodec};
use hearthgate_session::memory::StoredCharacter;
use hearthgate_session::ItemRecord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    addr: String,
    gateway: Arc<MemoryGateway>,
    database: Arc<MemoryDatabase>,
    gameplay: Arc<ScriptedGameplay>,
    registry: Arc<PlayerRegistry>,
    sessions: Arc<SessionTable>,
}

fn hero_record(first_login: bool) -> CharacterRecord {
    CharacterRecord {
        char_id: 42,
        name: "Hero".into(),
        account: "acct".into(),
        job: 1,
        level: 5,
        gold: 50,
        hp: 30,
        mp: 20,
        map: "3".into(),
        x: 10,
        y: 20,
        first_login,
    }
}

/// Starts a server on a random port with one character, "Hero", whose
/// login ticket is 7.
async fn start_server(first_login: bool) -> TestServer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let gateway = Arc::new(MemoryGateway::new());
    gateway.register(7, "acct", "Hero");

    let (database, link) = MemoryDatabase::new();
    let database = Arc::new(database);
    database.insert(StoredCharacter {
        record: hero_record(first_login),
        bag: vec![ItemRecord {
            make_index: 1,
            item_index: 3,
            name: "Potion".into(),
            dura: 1,
            dura_max: 1,
        }],
        ..StoredCharacter::default()
    });

    let gameplay = Arc::new(ScriptedGameplay::new());
    let registry = Arc::new(PlayerRegistry::new());
    let services = Services {
        gateway: gateway.clone(),
        database: database.clone(),
        world: Arc::new(StaticWorld::default()),
        gameplay: gameplay.clone(),
        registry: registry.clone(),
    };

    let server = HearthgateServerBuilder::new()
        .bind("127.0.0.1:0")
        .database_link(link)
        .build(services)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let sessions = server.sessions();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    TestServer {
        addr,
        gateway,
        database,
        gameplay,
        registry,
        sessions,
    }
}

/// A raw TCP game client.
struct TestClient {
    stream: TcpStream,
    frames: FrameReassembler,
    inbox: VecDeque<DecodedMessage>,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        Self {
            stream,
            frames: FrameReassembler::new(64 * 1024),
            inbox: VecDeque::new(),
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write should succeed");
    }

    async fn send(&mut self, msg: &DecodedMessage) {
        let wire = BinaryMessageCodec.encode(msg).unwrap();
        self.send_raw(&wire).await;
    }

    async fn handshake(&mut self, login_id: u32, char_name: &str) {
        let descriptor = LoginDescriptor {
            login_id,
            char_name: char_name.into(),
            selected_char_id: 0,
            client_version: "1.0".into(),
            is_new_format: true,
        };
        let wire = VerificationCodec.encode(&descriptor).unwrap();
        self.send_raw(&wire).await;
    }

    /// Next message, or `None` once the server has closed the socket.
    async fn recv(&mut self) -> Option<DecodedMessage> {
        loop {
            if let Some(msg) = self.inbox.pop_front() {
                return Some(msg);
            }
            let mut buf = [0u8; 4096];
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf))
                .await
                .expect("server should answer in time")
                .expect("read should succeed");
            if n == 0 {
                return None;
            }
            for frame in self.frames.feed(&buf[..n]) {
                self.inbox.push_back(BinaryMessageCodec.decode(&frame).unwrap());
            }
        }
    }

    /// Reads until a message with `command` arrives; returns everything
    /// read including it.
    async fn recv_until(&mut self, command: u16) -> Vec<DecodedMessage> {
        let mut seen = Vec::new();
        while let Some(msg) = self.recv().await {
            let done = msg.command == command;
            seen.push(msg);
            if done {
                return seen;
            }
        }
        panic!("connection closed before command {command}; got {seen:?}");
    }

    /// Drains until the server closes the socket.
    async fn recv_to_close(&mut self) -> Vec<DecodedMessage> {
        let mut seen = Vec::new();
        while let Some(msg) = self.recv().await {
            seen.push(msg);
        }
        seen
    }

    /// Handshake, confirm, and wait for world entry.
    async fn log_in(&mut self) -> Vec<DecodedMessage> {
        self.handshake(7, "Hero").await;
        self.recv_until(server::SEND_NOTICE).await;
        self.send(&DecodedMessage::new(client::CONFIRM_NOTICE)).await;
        self.recv_until(server::WEIGHT_CHANGED).await
    }
}

fn commands(msgs: &[DecodedMessage]) -> Vec<u16> {
    msgs.iter().map(|m| m.command).collect()
}

/// Polls `check` until it holds or a second passes.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =========================================================================
// Login flow
// =========================================================================

#[tokio::test]
async fn test_full_login_reaches_world() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;

    client.handshake(7, "Hero").await;
    let notice = client.recv_until(server::SEND_NOTICE).await;
    assert_eq!(commands(&notice), vec![server::SEND_NOTICE]);

    client.send(&DecodedMessage::new(client::CONFIRM_NOTICE)).await;
    let entry = client.recv_until(server::WEIGHT_CHANGED).await;
    assert_eq!(
        commands(&entry),
        vec![
            server::LOGON,
            server::ABILITY,
            server::FEATURE_CHANGED,
            server::WEIGHT_CHANGED,
        ]
    );
    assert_eq!(entry[0].correlation, 42);
    assert_eq!(entry[0].params[..2], [10, 20]);

    let key = server.registry.find_by_name("Hero").expect("claimed");
    let character = server.gameplay.character(key).expect("in world");
    assert_eq!(character.bag.len(), 1);
    assert!(!server.gateway.is_pending(7));
}

#[tokio::test]
async fn test_handshake_split_over_writes() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;

    client.send_raw(b"garbage#***7/He").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"ro/3/1.0/0!").await;

    let notice = client.recv_until(server::SEND_NOTICE).await;
    assert_eq!(notice.len(), 1);
}

#[tokio::test]
async fn test_free_text_confirmation_over_tcp() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;

    client.handshake(7, "Hero").await;
    client.recv_until(server::SEND_NOTICE).await;
    client.send_raw(b"ok confirm please").await;

    let entry = client.recv_until(server::LOGON).await;
    assert_eq!(commands(&entry), vec![server::LOGON]);
}

#[tokio::test]
async fn test_first_login_is_saved() {
    let server = start_server(true).await;
    let mut client = TestClient::connect(&server.addr).await;

    client.log_in().await;
    let welcome = client.recv_until(server::SYS_MESSAGE).await;
    assert_eq!(welcome.len(), 1);

    let saved = eventually(|| {
        server
            .database
            .get("Hero")
            .is_some_and(|c| !c.record.first_login && c.record.gold == 150)
    })
    .await;
    assert!(saved, "first login should persist the grant");
}

// =========================================================================
// Rejections
// =========================================================================

#[tokio::test]
async fn test_unknown_login_is_told_and_closed() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;

    client.handshake(99, "Ghost").await;
    let msgs = client.recv_to_close().await;

    assert_eq!(commands(&msgs), vec![server::SYS_MESSAGE, server::DISCONNECT]);
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn test_duplicate_login_is_rejected() {
    let server = start_server(false).await;
    let mut first = TestClient::connect(&server.addr).await;
    first.log_in().await;

    // A second ticket for the same character.
    server.gateway.register(8, "acct", "Hero");
    let mut second = TestClient::connect(&server.addr).await;
    second.handshake(8, "Hero").await;
    let msgs = second.recv_to_close().await;

    assert_eq!(commands(&msgs), vec![server::SYS_MESSAGE, server::DISCONNECT]);
    assert!(msgs[0].text().contains("already logged in"));

    // The first session is untouched.
    first.send(&DecodedMessage::new(client::PING).with_correlation(5)).await;
    let pong = first.recv_until(server::PONG).await;
    assert_eq!(pong.last().map(|m| m.correlation), Some(5));
}

// =========================================================================
// Verified traffic
// =========================================================================

#[tokio::test]
async fn test_verified_commands_are_dispatched() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;
    client.log_in().await;

    client.send(&DecodedMessage::new(client::SAY).with_text("hello")).await;
    let echo = client.recv_until(server::SYS_MESSAGE).await;
    assert_eq!(echo.last().unwrap().text(), "hello");

    client.send(&DecodedMessage::new(9999)).await;
    let unknown = client.recv_until(server::UNKNOWN_COMMAND).await;
    assert_eq!(unknown.last().unwrap().params[0], 9999);
}

#[tokio::test]
async fn test_quit_closes_and_releases_character() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;
    client.log_in().await;
    let key = server.registry.find_by_name("Hero").unwrap();

    client.send(&DecodedMessage::new(client::QUIT)).await;
    let msgs = client.recv_to_close().await;
    assert_eq!(commands(&msgs), vec![server::DISCONNECT]);

    assert!(eventually(|| server.registry.find_by_name("Hero").is_none()).await);
    assert!(eventually(|| !server.sessions.contains(key)).await);
    assert_eq!(server.gameplay.left(), vec![key]);
}

#[tokio::test]
async fn test_client_drop_tears_down_once() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;
    client.log_in().await;
    let key = server.registry.find_by_name("Hero").unwrap();

    drop(client);

    assert!(eventually(|| server.registry.find_by_name("Hero").is_none()).await);
    assert!(eventually(|| server.sessions.is_empty()).await);
    assert_eq!(server.gameplay.left(), vec![key]);
}

#[tokio::test]
async fn test_kick_through_session_table() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;
    client.log_in().await;
    let key = server.registry.find_by_name("Hero").unwrap();

    assert!(server.sessions.kick(key, "Server restarting"));
    let msgs = client.recv_to_close().await;

    assert_eq!(commands(&msgs), vec![server::SYS_MESSAGE, server::DISCONNECT]);
    assert_eq!(msgs[0].text(), "Server restarting");
    assert!(eventually(|| server.registry.is_empty()).await);
}

#[tokio::test]
async fn test_forward_reaches_only_owning_session() {
    let server = start_server(false).await;
    let mut client = TestClient::connect(&server.addr).await;
    client.log_in().await;
    let key = server.registry.find_by_name("Hero").unwrap();

    let stray = DecodedMessage::new(server::SYS_MESSAGE)
        .with_correlation(key.get().wrapping_add(1_000))
        .with_text("not for you");
    assert!(!server.sessions.forward(stray));

    let mail = DecodedMessage::new(server::SYS_MESSAGE)
        .with_correlation(key.get())
        .with_text("you have mail");
    assert!(server.sessions.forward(mail));

    let got = client.recv_until(server::SYS_MESSAGE).await;
    assert_eq!(got.last().unwrap().text(), "you have mail");
}
