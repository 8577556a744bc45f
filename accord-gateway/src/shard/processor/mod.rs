//! Runs in the background and drives one shard's connection lifecycle.

pub mod heartbeat;

mod session;
mod socket_forwarder;

pub use self::{
    heartbeat::Latency,
    session::{Session, SessionSendError, SessionSendErrorType},
};

use self::socket_forwarder::SocketForwarder;
use super::{
    close_code::{classify, CloseAction},
    config::Config,
    emitter::Emitter,
    stage::Stage,
};
use crate::event::{
    Connected, Connecting, Disconnected, Dispatch, Event, Identifying, Reconnecting, Resuming,
};
use accord_gateway_queue::IdentifyTicket;
use accord_model::gateway::{
    payload::{
        incoming::{Hello, Ready},
        outgoing::{Heartbeat, Identify, IdentifyInfo, IdentifyProperties, Resume},
    },
    GatewayEvent, OpCode,
};
use rand::Rng;
use std::{
    borrow::Cow,
    env::consts::OS,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{
        mpsc::UnboundedReceiver,
        watch::{channel as watch_channel, Receiver as WatchReceiver, Sender as WatchSender},
    },
    time::sleep,
};
use tokio_tungstenite::{
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

/// The stream a shard's connection runs over.
pub(crate) type ShardStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnect backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(120);

/// Connecting to the gateway failed.
#[derive(Debug)]
pub struct ConnectingError {
    kind: ConnectingErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ConnectingError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ConnectingErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ConnectingErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for ConnectingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ConnectingErrorType::Establishing => f.write_str("failed to establish the connection"),
            ConnectingErrorType::ParsingUrl { url } => {
                f.write_str("the gateway url `")?;
                f.write_str(url)?;

                f.write_str("` is invalid")
            }
        }
    }
}

impl Error for ConnectingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`ConnectingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConnectingErrorType {
    /// The websocket handshake failed.
    Establishing,
    /// The URL to connect to is invalid.
    ParsingUrl {
        /// The URL in question.
        url: String,
    },
}

/// The shard stopped for a non-recoverable reason.
#[derive(Debug)]
pub struct FatalError {
    kind: FatalErrorType,
}

impl FatalError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &FatalErrorType {
        &self.kind
    }
}

impl Display for FatalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            FatalErrorType::AuthenticationInvalid { shard_id } => {
                f.write_str("the authentication token for shard ")?;
                Display::fmt(&shard_id, f)?;

                f.write_str(" is invalid")
            }
            FatalErrorType::IntentsDisallowed { shard_id } => {
                f.write_str("shard ")?;
                Display::fmt(&shard_id, f)?;

                f.write_str(" requested intents it is not allowed to use")
            }
            FatalErrorType::IntentsInvalid { shard_id } => {
                f.write_str("shard ")?;
                Display::fmt(&shard_id, f)?;

                f.write_str(" requested invalid intents")
            }
            FatalErrorType::InvalidShard { shard_id } => {
                f.write_str("shard ")?;
                Display::fmt(&shard_id, f)?;

                f.write_str(" was rejected as an invalid shard")
            }
            FatalErrorType::ShardingRequired { shard_id } => {
                f.write_str("the connection of shard ")?;
                Display::fmt(&shard_id, f)?;

                f.write_str(" requires sharding")
            }
        }
    }
}

impl Error for FatalError {}

/// Type of [`FatalError`] that occurred.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub enum FatalErrorType {
    /// The token is invalid.
    AuthenticationInvalid {
        /// ID of the shard.
        shard_id: u64,
    },
    /// At least one requested intent is disallowed for the application.
    IntentsDisallowed {
        /// ID of the shard.
        shard_id: u64,
    },
    /// At least one requested intent is invalid.
    IntentsInvalid {
        /// ID of the shard.
        shard_id: u64,
    },
    /// The shard's ID is invalid for the application.
    InvalidShard {
        /// ID of the shard.
        shard_id: u64,
    },
    /// The application has too many guilds for its shard count.
    ShardingRequired {
        /// ID of the shard.
        shard_id: u64,
    },
}

/// Processing a single payload failed.
#[derive(Debug)]
struct ProcessError {
    kind: ProcessErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProcessError {
    /// Whether the session's socket is gone.
    const fn fatal(&self) -> bool {
        matches!(self.kind, ProcessErrorType::SessionSend)
    }

    fn parsing(source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            kind: ProcessErrorType::ParsingPayload,
            source: Some(Box::new(source)),
        }
    }

    fn session_send(source: SessionSendError) -> Self {
        Self {
            kind: ProcessErrorType::SessionSend,
            source: Some(Box::new(source)),
        }
    }
}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ProcessErrorType::EventTypeMissing => {
                f.write_str("dispatch payload has no event type")
            }
            ProcessErrorType::InvalidHello => {
                f.write_str("hello specified a zero heartbeat interval")
            }
            ProcessErrorType::ParsingPayload => f.write_str("payload could not be parsed as json"),
            ProcessErrorType::SequenceMissing => f.write_str("sequence missing from payload"),
            ProcessErrorType::SessionSend => f.write_str("sending a message over the session failed"),
            ProcessErrorType::UnexpectedOpcode { op } => {
                f.write_str("opcode ")?;
                Display::fmt(op, f)?;

                f.write_str(" is not valid here")
            }
        }
    }
}

impl Error for ProcessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`ProcessError`] that occurred.
#[derive(Debug)]
enum ProcessErrorType {
    /// A dispatch arrived without an event name.
    EventTypeMissing,
    /// HELLO specified a zero heartbeat interval.
    InvalidHello,
    /// A payload wasn't valid JSON for its opcode.
    ParsingPayload,
    /// A dispatch arrived without a sequence.
    SequenceMissing,
    /// Sending over the session failed.
    SessionSend,
    /// An opcode arrived in a position where it is not allowed.
    UnexpectedOpcode {
        /// The offending opcode.
        op: u8,
    },
}

/// Drives one shard's connection: handshakes, heartbeats, dispatch,
/// reconnection.
pub struct ShardProcessor {
    backoff: Duration,
    config: Arc<Config>,
    emitter: Emitter,
    protocol_strikes: u8,
    rx: UnboundedReceiver<Message>,
    session: Arc<Session>,
    shutdown: Arc<AtomicBool>,
    ticket: Option<IdentifyTicket>,
    url: Box<str>,
    wtx: WatchSender<Arc<Session>>,
}

impl ShardProcessor {
    /// Connect to the gateway, returning the processor and a watch on its
    /// session.
    pub(crate) async fn new(
        config: Arc<Config>,
        mut url: String,
        emitter: Emitter,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(Self, WatchReceiver<Arc<Session>>), ConnectingError> {
        // The service wants the version and encoding spelled out.
        url.push_str("?v=9&encoding=json");

        emitter.event(Event::ShardConnecting(Connecting {
            gateway: url.clone(),
            shard_id: config.shard()[0],
        }));

        let stream = connect(&url).await?;
        let (forwarder, rx, tx) = SocketForwarder::new(stream);
        tokio::spawn(forwarder.run());

        let session = Arc::new(Session::new(tx));
        session.set_stage(Stage::AwaitingHello);

        // Session details from a previous process, if resuming across
        // restarts of the shard.
        if let (Some(id), Some(seq)) = (config.session_id(), config.sequence()) {
            session.set_id(id.into());
            session.set_seq(seq);
        }

        let (wtx, wrx) = watch_channel(Arc::clone(&session));

        Ok((
            Self {
                backoff: Duration::from_secs(1),
                config,
                emitter,
                protocol_strikes: 0,
                rx,
                session,
                shutdown,
                ticket: None,
                url: url.into_boxed_str(),
                wtx,
            },
            wrx,
        ))
    }

    pub(crate) async fn run(mut self) {
        loop {
            let message = match self.rx.recv().await {
                Some(message) => message,
                None => {
                    // The socket ended without a close frame.
                    if self.drain_if_shutdown() {
                        break;
                    }

                    self.emit_disconnected(None, None);
                    self.resume().await;

                    continue;
                }
            };

            match message {
                Message::Binary(bytes) => {
                    if let Err(source) = self.process_bytes(&bytes).await {
                        if self.handle_process_error(source).await {
                            break;
                        }
                    }
                }
                Message::Text(text) => {
                    if let Err(source) = self.process_bytes(text.as_bytes()).await {
                        if self.handle_process_error(source).await {
                            break;
                        }
                    }
                }
                Message::Close(frame) => {
                    self.emit_disconnected(
                        frame.as_ref().map(|frame| frame.code.into()),
                        frame.as_ref().map(|frame| frame.reason.to_string()),
                    );

                    if self.drain_if_shutdown() {
                        break;
                    }

                    if self.handle_close(frame.as_ref()).await.is_err() {
                        break;
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// When a shutdown was requested, drain to idle instead of reconnecting.
    ///
    /// Returns whether the processor should stop.
    fn drain_if_shutdown(&mut self) -> bool {
        if !self.shutdown.load(Ordering::Relaxed) {
            return false;
        }

        tracing::debug!(shard_id = self.config.shard()[0], "shard draining to idle");

        self.session.stop_heartbeater();
        self.session.set_stage(Stage::Idle);
        self.ticket.take();

        true
    }

    async fn process_bytes(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        let event: GatewayEvent =
            serde_json::from_slice(bytes).map_err(ProcessError::parsing)?;

        self.process(event).await
    }

    async fn process(&mut self, event: GatewayEvent) -> Result<(), ProcessError> {
        let op = OpCode::from_repr(event.op).ok_or(ProcessError {
            kind: ProcessErrorType::UnexpectedOpcode { op: event.op },
            source: None,
        })?;

        match op {
            OpCode::Dispatch => self.process_dispatch(event)?,
            OpCode::Heartbeat => self.process_heartbeat().await,
            OpCode::HeartbeatAck => {
                self.session.heartbeats.receive();
                self.emitter.event(Event::GatewayHeartbeatAck);
            }
            OpCode::Hello => self.process_hello(event).await?,
            OpCode::InvalidSession => self.process_invalid_session(event).await?,
            OpCode::Reconnect => self.process_reconnect().await?,
            _ => {
                return Err(ProcessError {
                    kind: ProcessErrorType::UnexpectedOpcode { op: event.op },
                    source: None,
                })
            }
        }

        Ok(())
    }

    fn process_dispatch(&mut self, event: GatewayEvent) -> Result<(), ProcessError> {
        let seq = event.s.ok_or(ProcessError {
            kind: ProcessErrorType::SequenceMissing,
            source: None,
        })?;
        let name = event.t.ok_or(ProcessError {
            kind: ProcessErrorType::EventTypeMissing,
            source: None,
        })?;

        self.session.set_seq(seq);

        match name.as_str() {
            "READY" => {
                let ready: Ready =
                    serde_json::from_value(event.d).map_err(ProcessError::parsing)?;

                tracing::debug!(
                    shard_id = self.config.shard()[0],
                    session_id = &*ready.session_id,
                    guilds = ready.guilds.len(),
                    "session is ready"
                );

                self.session.set_id(ready.session_id.clone().into_boxed_str());
                self.session.set_stage(Stage::Active);
                self.protocol_strikes = 0;
                self.backoff = Duration::from_secs(1);

                // The identify handshake is complete; free the gate.
                self.ticket.take();

                self.emitter.event(Event::ShardConnected(Connected {
                    heartbeat_interval: self.session.heartbeat_interval(),
                    shard_id: self.config.shard()[0],
                }));
                self.emitter.event(Event::Ready(Box::new(ready)));
            }
            "RESUMED" => {
                tracing::debug!(shard_id = self.config.shard()[0], seq, "session resumed");

                self.session.set_stage(Stage::Active);
                self.backoff = Duration::from_secs(1);
                self.session.heartbeats.receive();

                self.emitter.event(Event::ShardConnected(Connected {
                    heartbeat_interval: self.session.heartbeat_interval(),
                    shard_id: self.config.shard()[0],
                }));
                self.emitter.event(Event::Resumed);
            }
            _ => {
                self.emitter.event(Event::Dispatch(Box::new(Dispatch {
                    data: event.d,
                    name,
                    seq,
                })));
            }
        }

        Ok(())
    }

    /// The gateway asked for an immediate heartbeat.
    async fn process_heartbeat(&mut self) {
        if let Err(source) = self.session.send(&Heartbeat::new(self.session.seq())) {
            tracing::warn!("sending a requested heartbeat failed, reconnecting: {source}");

            self.emit_disconnected(None, None);
            self.resume().await;
        }
    }

    async fn process_hello(&mut self, event: GatewayEvent) -> Result<(), ProcessError> {
        let hello: Hello = serde_json::from_value(event.d).map_err(ProcessError::parsing)?;

        if hello.heartbeat_interval == 0 {
            return Err(ProcessError {
                kind: ProcessErrorType::InvalidHello,
                source: None,
            });
        }

        tracing::debug!(
            shard_id = self.config.shard()[0],
            interval = hello.heartbeat_interval,
            "got hello"
        );

        self.emitter.event(Event::GatewayHello(hello.heartbeat_interval));

        self.session.set_heartbeat_interval(hello.heartbeat_interval);
        self.session.start_heartbeater();

        if let Some(session_id) = self.session.id() {
            let seq = self.session.seq();

            self.session.set_stage(Stage::Resuming);
            self.emitter.event(Event::ShardResuming(Resuming {
                seq,
                shard_id: self.config.shard()[0],
            }));

            tracing::debug!(
                shard_id = self.config.shard()[0],
                seq,
                "resuming session"
            );

            self.session
                .send(&Resume::new(seq, &*session_id, self.config.token()))
                .map_err(ProcessError::session_send)?;
        } else {
            self.identify().await?;
        }

        Ok(())
    }

    /// Wait for an identify allowance, then send IDENTIFY.
    async fn identify(&mut self) -> Result<(), ProcessError> {
        self.session.set_stage(Stage::AwaitingIdentify);
        self.acquire_ticket().await;
        self.session.set_stage(Stage::Identifying);

        self.emitter.event(Event::ShardIdentifying(Identifying {
            shard_id: self.config.shard()[0],
            shard_total: self.config.shard()[1],
        }));

        let identify = Identify::new(IdentifyInfo {
            compress: false,
            large_threshold: Some(self.config.large_threshold()),
            properties: self
                .config
                .identify_properties()
                .cloned()
                .unwrap_or_else(default_identify_properties),
            shard: Some(self.config.shard()),
            token: self.config.token().to_owned(),
        });

        self.session
            .send(&identify)
            .map_err(ProcessError::session_send)
    }

    /// Block on the identify gate while keeping heartbeats honest.
    ///
    /// Acknowledgements arriving while waiting are still applied, so a long
    /// wait at the gate can't look like a dead connection.
    async fn acquire_ticket(&mut self) {
        // Release anything held from a failed attempt first.
        self.ticket.take();

        let queue = Arc::clone(self.config.queue());
        let shard = self.config.shard();

        let mut acquire = queue.acquire(shard);

        loop {
            tokio::select! {
                result = &mut acquire => match result {
                    Ok(ticket) => {
                        self.ticket = Some(ticket);

                        return;
                    }
                    Err(source) => {
                        tracing::warn!(
                            shard_id = shard[0],
                            "identify gate failed, retrying: {source}"
                        );

                        sleep(Duration::from_secs(1)).await;

                        acquire = queue.acquire(shard);
                    }
                },
                Some(message) = self.rx.recv() => self.process_while_waiting(&message),
            }
        }
    }

    /// Minimal handling of traffic that arrives while parked at the gate.
    fn process_while_waiting(&self, message: &Message) {
        let bytes = match message {
            Message::Binary(bytes) => bytes.as_slice(),
            Message::Text(text) => text.as_bytes(),
            _ => return,
        };

        let Ok(event) = serde_json::from_slice::<GatewayEvent>(bytes) else {
            return;
        };

        match OpCode::from_repr(event.op) {
            Some(OpCode::HeartbeatAck) => self.session.heartbeats.receive(),
            Some(OpCode::Heartbeat) => {
                let _ = self.session.send(&Heartbeat::new(self.session.seq()));
            }
            _ => tracing::debug!(op = event.op, "deferring payload while awaiting identify turn"),
        }
    }

    async fn process_invalid_session(&mut self, event: GatewayEvent) -> Result<(), ProcessError> {
        let resumable = serde_json::from_value(event.d).unwrap_or(false);

        tracing::debug!(
            shard_id = self.config.shard()[0],
            resumable,
            "session was invalidated"
        );

        self.emitter.event(Event::GatewayInvalidateSession(resumable));

        // The service wants a short, spread-out wait before the next
        // handshake attempt.
        let wait = Duration::from_millis(rand::thread_rng().gen_range(1_000..=5_000));
        sleep(wait).await;

        if resumable && self.session.id().is_some() {
            let seq = self.session.seq();
            let session_id = self.session.id().expect("session id just checked");

            self.session.set_stage(Stage::Resuming);
            self.emitter.event(Event::ShardResuming(Resuming {
                seq,
                shard_id: self.config.shard()[0],
            }));

            self.session
                .send(&Resume::new(seq, &*session_id, self.config.token()))
                .map_err(ProcessError::session_send)?;
        } else {
            self.session.clear_id();
            self.session.set_seq(0);

            self.identify().await?;
        }

        Ok(())
    }

    async fn process_reconnect(&mut self) -> Result<(), ProcessError> {
        tracing::debug!(shard_id = self.config.shard()[0], "got request to reconnect");

        self.emitter.event(Event::GatewayReconnect);

        let frame = CloseFrame {
            code: CloseCode::Restart,
            reason: Cow::Borrowed("reconnecting"),
        };

        if self.session.close(Some(frame.clone())).is_err() {
            return Err(ProcessError {
                kind: ProcessErrorType::SessionSend,
                source: None,
            });
        }

        self.emit_disconnected(Some(frame.code.into()), Some(frame.reason.to_string()));
        self.resume().await;

        Ok(())
    }

    /// React to a processing failure.
    ///
    /// Returns whether the processor should stop.
    async fn handle_process_error(&mut self, error: ProcessError) -> bool {
        tracing::warn!(
            shard_id = self.config.shard()[0],
            stage = %self.session.stage(),
            "processing payload failed: {error}"
        );

        if error.fatal() {
            // The socket is gone; nothing to close.
            self.emit_disconnected(None, None);
            self.resume().await;

            return false;
        }

        // A malformed frame or misplaced opcode. Close abnormally and
        // resume once; a second offense on the same session drops it.
        self.protocol_strikes = self.protocol_strikes.saturating_add(1);

        let frame = CloseFrame {
            code: CloseCode::Library(4000),
            reason: Cow::Borrowed("protocol error"),
        };
        let _ = self.session.close(Some(frame));

        self.emit_disconnected(None, None);

        if self.protocol_strikes > 1 {
            tracing::warn!(
                shard_id = self.config.shard()[0],
                "protocol error recurred on this session, re-identifying"
            );

            self.reconnect().await;
        } else {
            self.resume().await;
        }

        false
    }

    /// React to a close frame per the close-code table.
    ///
    /// An `Err` means the shard is dead and must stop.
    async fn handle_close(&mut self, frame: Option<&CloseFrame<'_>>) -> Result<(), FatalError> {
        let code = frame.map(|frame| u16::from(frame.code));

        tracing::info!(
            shard_id = self.config.shard()[0],
            code,
            "connection closed"
        );

        match code.map_or(CloseAction::Resumable, classify) {
            CloseAction::Dead => {
                let shard_id = self.config.shard()[0];
                let kind = match code {
                    Some(4010) => FatalErrorType::InvalidShard { shard_id },
                    Some(4011) => FatalErrorType::ShardingRequired { shard_id },
                    Some(4013) => FatalErrorType::IntentsInvalid { shard_id },
                    Some(4014) => FatalErrorType::IntentsDisallowed { shard_id },
                    _ => FatalErrorType::AuthenticationInvalid { shard_id },
                };
                let error = FatalError { kind };

                tracing::error!(shard_id, "shard is dead: {error}");

                self.session.stop_heartbeater();
                self.session.set_stage(Stage::Dead);
                self.ticket.take();

                Err(error)
            }
            CloseAction::RestartCleanly => {
                self.reconnect().await;

                Ok(())
            }
            CloseAction::Resumable => {
                self.resume().await;

                Ok(())
            }
        }
    }

    /// Reconnect preserving the session, falling back to a clean restart
    /// when there is none.
    async fn resume(&mut self) {
        self.session.stop_heartbeater();

        if self.session.id().is_none() {
            tracing::debug!(
                shard_id = self.config.shard()[0],
                "no session to resume, reconnecting cleanly"
            );

            self.reconnect().await;

            return;
        }

        self.backoff_reconnect(true).await;
    }

    /// Reconnect dropping the session; the next HELLO leads to IDENTIFY.
    async fn reconnect(&mut self) {
        self.session.stop_heartbeater();
        self.ticket.take();
        self.session.clear_id();
        self.session.set_seq(0);

        self.backoff_reconnect(false).await;
    }

    /// Sleep out the exponential backoff, then open a fresh connection.
    async fn backoff_reconnect(&mut self, preserve_session: bool) {
        loop {
            if self.drain_if_shutdown() {
                return;
            }

            self.session.set_stage(Stage::Backoff);

            let wait = self.backoff;
            self.backoff = (self.backoff * 2).min(BACKOFF_CAP);

            tracing::debug!(
                shard_id = self.config.shard()[0],
                wait_in_seconds = wait.as_secs(),
                "waiting before reconnecting"
            );

            sleep(wait).await;

            if self.drain_if_shutdown() {
                return;
            }

            self.emitter.event(Event::ShardReconnecting(Reconnecting {
                shard_id: self.config.shard()[0],
            }));
            self.session.set_stage(Stage::Connecting);
            self.emitter.event(Event::ShardConnecting(Connecting {
                gateway: self.url.clone().into_string(),
                shard_id: self.config.shard()[0],
            }));

            match connect(&self.url).await {
                Ok(stream) => {
                    self.set_session(stream, preserve_session);

                    return;
                }
                Err(source) => {
                    tracing::warn!(
                        shard_id = self.config.shard()[0],
                        "reconnecting failed: {source}"
                    );
                }
            }
        }
    }

    /// Install a new connection, optionally carrying the session over.
    fn set_session(&mut self, stream: ShardStream, preserve_session: bool) {
        let old_id = self.session.id();
        let old_seq = self.session.seq();

        let (forwarder, rx, tx) = SocketForwarder::new(stream);
        tokio::spawn(forwarder.run());

        self.rx = rx;
        self.session = Arc::new(Session::new(tx));
        self.session.set_stage(Stage::AwaitingHello);

        if preserve_session {
            if let Some(id) = old_id {
                self.session.set_id(id);
                self.session.set_seq(old_seq);
            }
        }

        if self.wtx.send(Arc::clone(&self.session)).is_err() {
            tracing::error!("failed to broadcast the new session");
        }
    }

    fn emit_disconnected(&self, code: Option<u16>, reason: Option<String>) {
        self.emitter.event(Event::ShardDisconnected(Disconnected {
            code,
            reason,
            shard_id: self.config.shard()[0],
        }));
    }
}

/// Open a websocket connection to the gateway.
async fn connect(url: &str) -> Result<ShardStream, ConnectingError> {
    let url = Url::parse(url).map_err(|source| ConnectingError {
        kind: ConnectingErrorType::ParsingUrl {
            url: url.to_owned(),
        },
        source: Some(Box::new(source)),
    })?;

    // Frame and message size limits are disabled; the service is not a
    // malicious peer.
    let config = WebSocketConfig {
        accept_unmasked_frames: false,
        max_frame_size: None,
        max_message_size: None,
        max_send_queue: None,
    };

    let (stream, _) = tokio_tungstenite::connect_async_with_config(url, Some(config))
        .await
        .map_err(|source| ConnectingError {
            kind: ConnectingErrorType::Establishing,
            source: Some(Box::new(source)),
        })?;

    tracing::debug!("shook hands with the gateway");

    Ok(stream)
}

/// Identify properties used when the user configures none.
fn default_identify_properties() -> IdentifyProperties {
    IdentifyProperties::new("accord", "accord", OS)
}
