//! World connection state machine
//!
//! Two producers converge on one state object: command intents from the
//! owning session, and pushes from the server handled by a background
//! reader task. The state lives behind a mutex shared with that task;
//! every mutation is a single assignment under the lock, so a command
//! never observes a partial write from reconciliation.

use crate::framing::{FrameRead, FrameWrite, LineFrameReader, LineFrameWriter};
use crate::wire::{ClientFrame, OpcodeTable, ServerFrame, decode};
use bq_core::{
    BridgeError, CommandIntent, PlayerId, Position, Result, Vitals, compass_delta,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connection configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// World server address (host:port)
    pub server_addr: String,
    /// Deadline for establishing the TCP connection
    pub connect_timeout: Duration,
    /// Deadline for the welcome after hello is sent
    pub handshake_timeout: Duration,
    /// Opcode numbering of the target server
    pub opcodes: OpcodeTable,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8000".into(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            opcodes: OpcodeTable::default(),
        }
    }
}

/// Connection lifecycle. Transitions are forward-only; `Closed` is
/// terminal and non-resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingWelcome,
    Ready,
    Closed,
}

/// State reconciled between commands and server pushes
#[derive(Debug)]
struct WorldState {
    connection: ConnectionState,
    identity: Option<PlayerId>,
    position: Position,
    vitals: Option<Vitals>,
}

struct Shared {
    state: Mutex<WorldState>,
    /// Present only while a handshake is waiting; taking it is what
    /// makes the welcome resolve exactly once. The reader task applies
    /// the welcome state itself, so the channel carries just the
    /// assigned identity.
    welcome_slot: Mutex<Option<oneshot::Sender<PlayerId>>>,
}

/// Client for one world-server connection.
///
/// Constructed per join attempt. Commands require exclusive access
/// (`&mut self`); the owning session serializes them.
pub struct WorldBot {
    config: BotConfig,
    shared: Arc<Shared>,
    writer: Option<Box<dyn FrameWrite>>,
    reader_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WorldBot {
    pub fn new(config: BotConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(WorldState {
                    connection: ConnectionState::Disconnected,
                    identity: None,
                    position: Position::default(),
                    vitals: None,
                }),
                welcome_slot: Mutex::new(None),
            }),
            writer: None,
            reader_handle: None,
        }
    }

    /// Dial the configured world server.
    pub async fn connect(&mut self) -> Result<()> {
        {
            let st = self.shared.state.lock().await;
            if st.connection != ConnectionState::Disconnected {
                return Err(BridgeError::ConnectFailed(
                    "connection already used".into(),
                ));
            }
        }
        let addr = self.config.server_addr.clone();
        info!("connecting to world server at {}", addr);

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.close().await;
                return Err(BridgeError::ConnectFailed(format!("{addr}: {e}")));
            }
            Err(_) => {
                self.close().await;
                return Err(BridgeError::ConnectFailed(format!("{addr}: connect timed out")));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {}", e);
        }
        self.attach(stream).await;
        Ok(())
    }

    /// Adopt an already-established transport and start the reader
    /// task. `connect` calls this with a TCP stream; tests hand in an
    /// in-memory duplex pipe.
    pub async fn attach<S>(&mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Sync + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        self.writer = Some(Box::new(LineFrameWriter::new(write_half)));

        let shared = self.shared.clone();
        let opcodes = self.config.opcodes;
        self.reader_handle = Some(tokio::spawn(reader_task(
            LineFrameReader::new(read_half),
            shared,
            opcodes,
        )));

        self.shared.state.lock().await.connection = ConnectionState::Connecting;
    }

    /// Send hello and wait for the server's welcome.
    ///
    /// Resolves exactly once: the reader task consumes the pending
    /// waiter on the first welcome, records the welcome state, and
    /// moves the connection to `Ready`; later welcomes are dropped. If
    /// no welcome arrives within the deadline the connection is closed
    /// and the join attempt fails.
    pub async fn handshake(&mut self, display_name: &str) -> Result<PlayerId> {
        {
            let mut st = self.shared.state.lock().await;
            if st.connection != ConnectionState::Connecting {
                return Err(BridgeError::HandshakeFailed("transport not open".into()));
            }
            st.connection = ConnectionState::AwaitingWelcome;
        }

        let (tx, rx) = oneshot::channel();
        *self.shared.welcome_slot.lock().await = Some(tx);

        let hello = ClientFrame::Hello {
            name: display_name.to_string(),
        }
        .encode(&self.config.opcodes)?;
        if let Err(e) = self.send_frame(&hello).await {
            self.close().await;
            return Err(e);
        }

        match timeout(self.config.handshake_timeout, rx).await {
            Err(_) => {
                warn!("handshake timed out after {:?}", self.config.handshake_timeout);
                self.close().await;
                Err(BridgeError::HandshakeTimeout)
            }
            Ok(Err(_)) => {
                // Reader task dropped the slot: connection died first.
                self.close().await;
                Err(BridgeError::HandshakeFailed(
                    "connection closed before welcome".into(),
                ))
            }
            Ok(Ok(id)) => {
                info!(id = %id, "handshake complete");
                Ok(id)
            }
        }
    }

    /// Execute one parsed command against the connection.
    ///
    /// `look`/`where` are pure reads. `move` sends the target to the
    /// server and applies it locally right away; the server's next
    /// authoritative push corrects the guess if the move was rejected.
    pub async fn apply_intent(&mut self, intent: &CommandIntent) -> Result<String> {
        if self.connection_state().await != ConnectionState::Ready {
            return Err(BridgeError::NotConnected);
        }

        match intent.verb.as_str() {
            "look" | "where" => {
                let st = self.shared.state.lock().await;
                Ok(format!("You are at ({}, {}).", st.position.x, st.position.y))
            }
            "move" | "m" => {
                let direction = intent.argument.as_deref().unwrap_or("").to_lowercase();
                let delta = compass_delta(&direction)
                    .ok_or_else(|| BridgeError::UnknownDirection(direction.clone()))?;
                let target = self.shared.state.lock().await.position.stepped(delta);

                let frame =
                    ClientFrame::Move { x: target.x, y: target.y }.encode(&self.config.opcodes)?;
                self.send_frame(&frame).await?;

                self.shared.state.lock().await.position = target;
                debug!(x = target.x, y = target.y, "optimistic move applied");
                Ok(format!("Moving {direction}..."))
            }
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }

    /// Tear the connection down. Idempotent, callable from any state;
    /// cancels a pending handshake wait.
    pub async fn close(&mut self) {
        self.writer = None;
        if let Some(handle) = self.reader_handle.take() {
            handle.abort();
        }
        self.shared.welcome_slot.lock().await.take();
        let mut st = self.shared.state.lock().await;
        if st.connection != ConnectionState::Closed {
            st.connection = ConnectionState::Closed;
            debug!("world connection closed");
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.shared.state.lock().await.connection
    }

    /// Identity assigned at handshake, if the handshake has completed.
    pub async fn identity(&self) -> Option<PlayerId> {
        self.shared.state.lock().await.identity.clone()
    }

    /// Current reconciled public state.
    pub async fn view(&self) -> (ConnectionState, Position, Option<Vitals>) {
        let st = self.shared.state.lock().await;
        (st.connection, st.position, st.vitals)
    }

    async fn send_frame(&mut self, frame: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(BridgeError::NotConnected)?;
        match writer.write_frame(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }
}

/// Background reconciliation loop: applies server pushes to the shared
/// state until the connection goes away.
///
/// Frames are applied in arrival order under the state lock, so a
/// welcome can never clobber an authoritative push that arrived after
/// it. Pushes that land before the welcome are dropped: until `Ready`
/// the state stays at the zero/unknown baseline.
async fn reader_task<R: FrameRead>(mut reader: R, shared: Arc<Shared>, opcodes: OpcodeTable) {
    loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => match decode(&opcodes, &frame) {
                Ok(ServerFrame::Welcome {
                    id,
                    position,
                    vitals,
                }) => match shared.welcome_slot.lock().await.take() {
                    Some(tx) => {
                        let applied = {
                            let mut st = shared.state.lock().await;
                            // A close that raced us wins; Closed stays
                            // terminal.
                            if st.connection == ConnectionState::AwaitingWelcome {
                                st.identity = Some(id.clone());
                                if let Some(position) = position {
                                    st.position = position;
                                }
                                if let Some(vitals) = vitals {
                                    st.vitals = Some(vitals);
                                }
                                st.connection = ConnectionState::Ready;
                                true
                            } else {
                                false
                            }
                        };
                        if applied {
                            let _ = tx.send(id);
                        } else {
                            debug!("welcome after close ignored");
                        }
                    }
                    None => debug!("late welcome ignored"),
                },
                // Server state always wins over the optimistic guess.
                Ok(ServerFrame::Position(position)) => {
                    let mut st = shared.state.lock().await;
                    if st.connection == ConnectionState::Ready {
                        st.position = position;
                    } else {
                        debug!("position push before welcome ignored");
                    }
                }
                Ok(ServerFrame::Health(vitals)) => {
                    let mut st = shared.state.lock().await;
                    if st.connection == ConnectionState::Ready {
                        st.vitals = Some(vitals);
                    } else {
                        debug!("health push before welcome ignored");
                    }
                }
                Ok(ServerFrame::Unknown(op)) => debug!(op, "ignoring unrecognized opcode"),
                Err(e) => warn!("dropping malformed frame: {}", e),
            },
            Ok(None) | Err(_) => break,
        }
    }

    // Connection gone: fail fast for anyone still waiting on it.
    shared.welcome_slot.lock().await.take();
    let mut st = shared.state.lock().await;
    if st.connection != ConnectionState::Closed {
        st.connection = ConnectionState::Closed;
        debug!("world connection lost");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bq_core::parse_command;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
    use tokio_test::assert_ok;

    struct FakeServer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        async fn push(&mut self, frame: &str) {
            self.writer.write_all(frame.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> serde_json::Value {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    fn test_config() -> BotConfig {
        BotConfig {
            handshake_timeout: Duration::from_millis(100),
            ..BotConfig::default()
        }
    }

    async fn attached_bot() -> (WorldBot, FakeServer) {
        let (client_side, server_side) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(server_side);
        let mut bot = WorldBot::new(test_config());
        bot.attach(client_side).await;
        (
            bot,
            FakeServer {
                reader: BufReader::new(read),
                writer: write,
            },
        )
    }

    /// Attached bot driven through the handshake with the given welcome.
    async fn ready_bot(welcome: &str) -> (WorldBot, FakeServer) {
        let (mut bot, mut server) = attached_bot().await;
        let server_welcome = welcome.to_string();
        let handle = tokio::spawn(async move {
            let hello = server.recv().await;
            assert_eq!(hello["op"], 0);
            server.push(&server_welcome).await;
            server
        });
        let id = bot.handshake("alice").await.unwrap();
        assert!(!id.is_empty());
        (bot, handle.await.unwrap())
    }

    async fn wait_until<F>(bot: &WorldBot, cond: F)
    where
        F: Fn(Position, Option<Vitals>) -> bool,
    {
        for _ in 0..100 {
            let (_, position, vitals) = bot.view().await;
            if cond(position, vitals) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("state never converged");
    }

    #[tokio::test]
    async fn handshake_records_welcome_state() {
        let (bot, _server) =
            ready_bot(r#"{"op":1,"id":"p1","x":5,"y":9,"hp":18,"maxHp":20}"#).await;
        let (state, position, vitals) = bot.view().await;
        assert_eq!(state, ConnectionState::Ready);
        assert_eq!(position, Position::new(5, 9));
        assert_eq!(
            vitals,
            Some(Vitals {
                current_health: 18,
                max_health: 20
            })
        );
        assert_eq!(bot.identity().await.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn handshake_without_initial_state_keeps_baseline() {
        let (bot, _server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        let (_, position, vitals) = bot.view().await;
        assert_eq!(position, Position::default());
        assert_eq!(vitals, None);
    }

    #[tokio::test]
    async fn handshake_times_out_without_welcome() {
        let (mut bot, _server) = attached_bot().await;
        let err = bot.handshake("alice").await.unwrap_err();
        assert!(matches!(err, BridgeError::HandshakeTimeout));
        assert_eq!(bot.connection_state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn handshake_fails_when_connection_drops() {
        let (mut bot, server) = attached_bot().await;
        drop(server);
        let err = bot.handshake("alice").await.unwrap_err();
        // Either the reader observes the EOF first or the hello write
        // fails; both must land the bot in Closed.
        assert!(matches!(
            err,
            BridgeError::HandshakeFailed(_) | BridgeError::NotConnected
        ));
        assert_eq!(bot.connection_state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn move_is_optimistic_before_any_confirmation() {
        let (mut bot, mut server) = ready_bot(r#"{"op":1,"id":"p1","x":0,"y":0}"#).await;

        let ack = bot.apply_intent(&parse_command("move n")).await.unwrap();
        assert_eq!(ack, "Moving n...");
        // Applied locally before the server has said anything.
        let (_, position, _) = bot.view().await;
        assert_eq!(position, Position::new(0, -1));

        let sent = server.recv().await;
        assert_eq!(sent["op"], 2);
        assert_eq!(sent["x"], 0);
        assert_eq!(sent["y"], -1);
    }

    #[tokio::test]
    async fn authoritative_position_overwrites_optimistic_guess() {
        let (mut bot, mut server) = ready_bot(r#"{"op":1,"id":"p1","x":0,"y":0}"#).await;
        assert_ok!(bot.apply_intent(&parse_command("move e")).await);
        let (_, position, _) = bot.view().await;
        assert_eq!(position, Position::new(1, 0));

        server.push(r#"{"op":3,"x":5,"y":5}"#).await;
        wait_until(&bot, |p, _| p == Position::new(5, 5)).await;
    }

    #[tokio::test]
    async fn push_right_behind_welcome_is_not_clobbered() {
        // Welcome and an authoritative correction arrive in one burst;
        // the newer push must survive the handshake resolving.
        let (mut bot, mut server) = attached_bot().await;
        let handle = tokio::spawn(async move {
            let hello = server.recv().await;
            assert_eq!(hello["op"], 0);
            server.push(r#"{"op":1,"id":"p1","x":0,"y":0}"#).await;
            server.push(r#"{"op":3,"x":5,"y":5}"#).await;
            server
        });
        bot.handshake("alice").await.unwrap();
        let _server = handle.await.unwrap();
        wait_until(&bot, |p, _| p == Position::new(5, 5)).await;
    }

    #[tokio::test]
    async fn pushes_before_welcome_keep_the_baseline() {
        let (bot, mut server) = attached_bot().await;
        server.push(r#"{"op":3,"x":9,"y":9}"#).await;
        server.push(r#"{"op":4,"hp":1,"maxHp":20}"#).await;
        // Give the reader time to see both frames; nothing may stick
        // before the handshake completes.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (state, position, vitals) = bot.view().await;
        assert_eq!(state, ConnectionState::Connecting);
        assert_eq!(position, Position::default());
        assert_eq!(vitals, None);
    }

    #[tokio::test]
    async fn authoritative_health_populates_vitals() {
        let (bot, mut server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        server.push(r#"{"op":4,"hp":10,"maxHp":20}"#).await;
        wait_until(&bot, |_, v| {
            v == Some(Vitals {
                current_health: 10,
                max_health: 20,
            })
        })
        .await;
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_leave_connection_open() {
        let (bot, mut server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        server.push("this is not json").await;
        server.push(r#"{"op":99,"payload":"future"}"#).await;
        server.push(r#"{"op":3,"x":2,"y":3}"#).await;
        wait_until(&bot, |p, _| p == Position::new(2, 3)).await;
        assert_eq!(bot.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn late_welcome_is_ignored() {
        let (bot, mut server) = ready_bot(r#"{"op":1,"id":"p1","x":1,"y":1}"#).await;
        server.push(r#"{"op":1,"id":"someone-else","x":9,"y":9}"#).await;
        // Identity must not change; prove the frame was consumed by
        // pushing a position update behind it.
        server.push(r#"{"op":3,"x":7,"y":7}"#).await;
        wait_until(&bot, |p, _| p == Position::new(7, 7)).await;
        assert_eq!(bot.identity().await.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn look_reports_current_position() {
        let (mut bot, _server) = ready_bot(r#"{"op":1,"id":"p1","x":4,"y":2}"#).await;
        let out = bot.apply_intent(&parse_command("look")).await.unwrap();
        assert_eq!(out, "You are at (4, 2).");
        let out = bot.apply_intent(&parse_command("where")).await.unwrap();
        assert_eq!(out, "You are at (4, 2).");
    }

    #[tokio::test]
    async fn unknown_direction_is_non_fatal() {
        let (mut bot, _server) = ready_bot(r#"{"op":1,"id":"p1","x":1,"y":0}"#).await;
        let err = bot.apply_intent(&parse_command("move bogus")).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownDirection(_)));
        let (state, position, _) = bot.view().await;
        assert_eq!(state, ConnectionState::Ready);
        assert_eq!(position, Position::new(1, 0));
    }

    #[tokio::test]
    async fn unknown_command_is_non_fatal() {
        let (mut bot, _server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        let err = bot.apply_intent(&parse_command("fly")).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownCommand(_)));
        assert_eq!(bot.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn commands_require_ready() {
        let (mut bot, _server) = attached_bot().await;
        let err = bot.apply_intent(&parse_command("look")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn close_is_terminal_and_idempotent() {
        let (mut bot, _server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        bot.close().await;
        bot.close().await;
        assert_eq!(bot.connection_state().await, ConnectionState::Closed);
        let err = bot.apply_intent(&parse_command("look")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn server_eof_moves_bot_to_closed() {
        let (bot, server) = ready_bot(r#"{"op":1,"id":"p1"}"#).await;
        drop(server);
        for _ in 0..100 {
            if bot.connection_state().await == ConnectionState::Closed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("bot never observed the disconnect");
    }

    #[tokio::test]
    async fn connect_refused_is_a_connect_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut bot = WorldBot::new(BotConfig {
            server_addr: addr.to_string(),
            ..test_config()
        });
        let err = bot.connect().await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectFailed(_)));
        assert_eq!(bot.connection_state().await, ConnectionState::Closed);
    }
}
