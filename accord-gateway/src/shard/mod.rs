//! Types for running and interacting with one gateway connection.
//!
//! The [`Shard`] is the handle: start it, send commands through it, shut it
//! down, and read [`Information`] about it. The connection itself runs on a
//! background processor task which owns the state machine: handshake,
//! heartbeat, dispatch, and reconnection with backoff.

pub mod stage;

mod builder;
mod close_code;
mod config;
mod emitter;
mod processor;

pub use self::{
    builder::{ShardBuilder, ShardIdError, ShardIdErrorType},
    close_code::{classify, CloseAction},
    config::Config,
    emitter::Events,
    processor::{
        ConnectingError, ConnectingErrorType, FatalError, FatalErrorType, Latency, Session,
        SessionSendError, SessionSendErrorType,
    },
    stage::Stage,
};

pub(crate) use self::emitter::Emitter;

use self::processor::ShardProcessor;
use serde::Serialize;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::watch::Receiver as WatchReceiver;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};

/// Starting a shard failed.
#[derive(Debug)]
pub struct ShardStartError {
    kind: ShardStartErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ShardStartError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ShardStartErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ShardStartErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for ShardStartError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ShardStartErrorType::Establishing => f.write_str("establishing the connection failed"),
            ShardStartErrorType::RetrievingGatewayUrl => {
                f.write_str("retrieving the gateway URL via HTTP failed")
            }
        }
    }
}

impl Error for ShardStartError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`ShardStartError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ShardStartErrorType {
    /// Establishing the websocket connection failed.
    Establishing,
    /// The gateway URL couldn't be fetched from the REST API.
    RetrievingGatewayUrl,
}

/// Sending a command over a shard failed.
#[derive(Debug)]
pub struct CommandError {
    kind: CommandErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl CommandError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &CommandErrorType {
        &self.kind
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            CommandErrorType::Sending => f.write_str("sending the command failed"),
            CommandErrorType::SessionInactive => f.write_str("the shard has no active session"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`CommandError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum CommandErrorType {
    /// The command failed to send over the socket.
    Sending,
    /// The shard has not been started.
    SessionInactive,
}

/// The shard has no active session.
#[derive(Debug)]
pub struct SessionInactiveError;

impl Display for SessionInactiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("the shard has no active session")
    }
}

impl Error for SessionInactiveError {}

/// Information about a running shard.
#[derive(Clone, Debug)]
pub struct Information {
    id: u64,
    latency: Latency,
    seq: u64,
    session_id: Option<Box<str>>,
    stage: Stage,
}

impl Information {
    /// ID of the shard.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Latency information of the shard's connection.
    #[must_use]
    pub const fn latency(&self) -> &Latency {
        &self.latency
    }

    /// The last received sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// The current session's ID, if one is up.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The current connection stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }
}

/// Session information needed to resume after shutting down.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResumeSession {
    /// ID of the session.
    pub session_id: String,
    /// Sequence to resume from.
    pub sequence: u64,
}

#[derive(Debug)]
struct ShardRef {
    config: Arc<Config>,
    emitter: Emitter,
    session: Mutex<Option<WatchReceiver<Arc<Session>>>>,
    shutdown: Arc<AtomicBool>,
}

/// A handle to one gateway connection.
///
/// Cheap to clone; clones point at the same shard.
#[derive(Clone, Debug)]
pub struct Shard(Arc<ShardRef>);

impl Shard {
    /// Create a shard with default configuration, along with its event
    /// stream.
    pub fn new(token: impl Into<String>) -> (Self, Events) {
        Self::builder(token).build()
    }

    /// Create a builder to configure a shard.
    pub fn builder(token: impl Into<String>) -> ShardBuilder {
        ShardBuilder::new(token)
    }

    pub(crate) fn new_with_config(config: Config, emitter: Emitter) -> Self {
        Self(Arc::new(ShardRef {
            config: Arc::new(config),
            emitter,
            session: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }))
    }

    /// Immutable reference to the shard's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Connect the shard and start its background processor.
    ///
    /// # Errors
    ///
    /// Returns a [`ShardStartErrorType::RetrievingGatewayUrl`] error type if
    /// no gateway URL was configured and fetching one failed.
    ///
    /// Returns a [`ShardStartErrorType::Establishing`] error type if the
    /// initial websocket connection failed.
    pub async fn start(&self) -> Result<(), ShardStartError> {
        self.0.shutdown.store(false, Ordering::Relaxed);

        let url = match self.0.config.gateway_url() {
            Some(url) => url.to_owned(),
            None => {
                let info = self
                    .0
                    .config
                    .http_client()
                    .gateway_authed()
                    .await
                    .map_err(|source| ShardStartError {
                        kind: ShardStartErrorType::RetrievingGatewayUrl,
                        source: Some(Box::new(source)),
                    })?;

                info.url
            }
        };

        let (processor, wrx) = ShardProcessor::new(
            Arc::clone(&self.0.config),
            url,
            self.0.emitter.clone(),
            Arc::clone(&self.0.shutdown),
        )
        .await
        .map_err(|source| ShardStartError {
            kind: ShardStartErrorType::Establishing,
            source: Some(Box::new(source)),
        })?;

        self.0
            .session
            .lock()
            .expect("session watch poisoned")
            .replace(wrx);

        let shard_id = self.0.config.shard()[0];

        tokio::spawn(async move {
            processor.run().await;

            tracing::debug!(shard_id, "shard processor ended");
        });

        Ok(())
    }

    /// Shut the shard down, draining it to idle without reconnecting.
    pub fn shutdown(&self) {
        self.0.shutdown.store(true, Ordering::Relaxed);

        if let Ok(session) = self.session() {
            session.stop_heartbeater();
            let _ = session.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
        }
    }

    /// Shut the shard down in a resumable way.
    ///
    /// Returns the shard's ID and the information needed to resume the
    /// session later, if one was up. The service only honors resumes for a
    /// few minutes after disconnection.
    pub fn shutdown_resumable(&self) -> (u64, Option<ResumeSession>) {
        self.0.shutdown.store(true, Ordering::Relaxed);

        let shard_id = self.0.config.shard()[0];

        let Ok(session) = self.session() else {
            return (shard_id, None);
        };

        session.stop_heartbeater();

        // A non-normal close code keeps the session resumable.
        let _ = session.close(Some(CloseFrame {
            code: CloseCode::Library(4000),
            reason: "shutting down resumable".into(),
        }));

        let resume = session.id().map(|session_id| ResumeSession {
            session_id: session_id.into_string(),
            sequence: session.seq(),
        });

        (shard_id, resume)
    }

    /// Send a raw command payload over the shard, such as a presence
    /// update.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandErrorType::SessionInactive`] error type if the
    /// shard has not been started, and a [`CommandErrorType::Sending`] error
    /// type if the socket rejected the payload.
    pub fn command(&self, value: &impl Serialize) -> Result<(), CommandError> {
        let session = self.session().map_err(|source| CommandError {
            kind: CommandErrorType::SessionInactive,
            source: Some(Box::new(source)),
        })?;

        session.send(value).map_err(|source| CommandError {
            kind: CommandErrorType::Sending,
            source: Some(Box::new(source)),
        })
    }

    /// Information about the shard's current session.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionInactiveError`] if the shard has not been started.
    pub fn info(&self) -> Result<Information, SessionInactiveError> {
        let session = self.session()?;

        Ok(Information {
            id: self.0.config.shard()[0],
            latency: session.heartbeats.latency(),
            seq: session.seq(),
            session_id: session.id(),
            stage: session.stage(),
        })
    }

    /// The current connection stage, [`Stage::Idle`] before the first
    /// start.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.session().map_or(Stage::Idle, |session| session.stage())
    }

    /// The current session, if the shard was started.
    fn session(&self) -> Result<Arc<Session>, SessionInactiveError> {
        let session = self.0.session.lock().expect("session watch poisoned");

        session
            .as_ref()
            .map(|watch| Arc::clone(&watch.borrow()))
            .ok_or(SessionInactiveError)
    }
}
