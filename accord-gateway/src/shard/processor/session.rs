//! Per-connection session state shared between the processor, the
//! heartbeater and the shard handle.

use super::heartbeat::{Heartbeater, Heartbeats};
use crate::shard::stage::Stage;
use serde::Serialize;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, Mutex,
    },
};
use tokio::{
    sync::mpsc::{error::SendError, UnboundedSender},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::{protocol::CloseFrame, Message};

/// Sending a payload over the session failed.
#[derive(Debug)]
pub struct SessionSendError {
    pub(crate) kind: SessionSendErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl SessionSendError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &SessionSendErrorType {
        &self.kind
    }
}

impl Display for SessionSendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            SessionSendErrorType::Sending => {
                f.write_str("the socket is gone; the shard has not started or has shut down")
            }
            SessionSendErrorType::Serializing => f.write_str("serializing the payload failed"),
        }
    }
}

impl Error for SessionSendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`SessionSendError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionSendErrorType {
    /// The receiving half of the socket channel hung up.
    Sending,
    /// Serializing the payload failed.
    Serializing,
}

/// State of one websocket connection.
#[derive(Debug)]
pub struct Session {
    heartbeater_handle: Mutex<Option<JoinHandle<()>>>,
    pub(crate) heartbeats: Arc<Heartbeats>,
    heartbeat_interval: AtomicU64,
    id: Mutex<Option<Box<str>>>,
    pub(crate) seq: Arc<AtomicU64>,
    stage: AtomicU8,
    pub(crate) tx: UnboundedSender<Message>,
}

impl Session {
    pub(crate) fn new(tx: UnboundedSender<Message>) -> Self {
        Self {
            heartbeater_handle: Mutex::new(None),
            heartbeats: Arc::new(Heartbeats::default()),
            heartbeat_interval: AtomicU64::new(0),
            id: Mutex::new(None),
            seq: Arc::new(AtomicU64::new(0)),
            stage: AtomicU8::new(Stage::default() as u8),
            tx,
        }
    }

    /// Send a payload as a message over the socket.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionSendErrorType::Serializing`] error type when the
    /// payload fails to serialize, and a [`SessionSendErrorType::Sending`]
    /// error type when the socket half hung up.
    pub fn send(&self, payload: &impl Serialize) -> Result<(), SessionSendError> {
        let bytes = serde_json::to_vec(payload).map_err(|source| SessionSendError {
            kind: SessionSendErrorType::Serializing,
            source: Some(Box::new(source)),
        })?;

        self.tx
            .send(Message::Binary(bytes))
            .map_err(|source| SessionSendError {
                kind: SessionSendErrorType::Sending,
                source: Some(Box::new(source)),
            })?;

        Ok(())
    }

    /// Send a close frame over the socket.
    pub fn close(&self, close_frame: Option<CloseFrame<'static>>) -> Result<(), SendError<Message>> {
        self.tx.send(Message::Close(close_frame))
    }

    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval.load(Ordering::Relaxed)
    }

    pub(crate) fn set_heartbeat_interval(&self, interval: u64) {
        self.heartbeat_interval.store(interval, Ordering::Release);
    }

    /// The last received sequence number.
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    pub(crate) fn set_seq(&self, seq: u64) {
        self.seq.store(seq, Ordering::Release);
    }

    /// The current connection stage.
    pub fn stage(&self) -> Stage {
        Stage::try_from(self.stage.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    /// ID of the session, if one is up.
    pub fn id(&self) -> Option<Box<str>> {
        self.id.lock().expect("id poisoned").clone()
    }

    pub(crate) fn set_id(&self, id: Box<str>) {
        self.id.lock().expect("id poisoned").replace(id);
    }

    pub(crate) fn clear_id(&self) {
        self.id.lock().expect("id poisoned").take();
    }

    pub(crate) fn start_heartbeater(&self) {
        let heartbeater = Heartbeater::new(
            Arc::clone(&self.heartbeats),
            self.heartbeat_interval(),
            Arc::clone(&self.seq),
            self.tx.clone(),
        );

        let handle = tokio::spawn(heartbeater.run());

        if let Some(old) = self
            .heartbeater_handle
            .lock()
            .expect("heartbeater poisoned")
            .replace(handle)
        {
            old.abort();
        }
    }

    pub(crate) fn stop_heartbeater(&self) {
        if let Some(handle) = self
            .heartbeater_handle
            .lock()
            .expect("heartbeater poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_heartbeater();
    }
}
