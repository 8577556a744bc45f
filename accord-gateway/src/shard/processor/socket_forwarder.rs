//! Pump between the websocket stream and the processor's channels.

use super::ShardStream;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::timeout,
};
use tokio_tungstenite::tungstenite::Message;

/// Forwards messages between the socket and the processor.
///
/// Owning the stream in a separate task lets the processor suspend on other
/// work (timers, the identify gate) while traffic keeps flowing.
pub(crate) struct SocketForwarder {
    rx: UnboundedReceiver<Message>,
    stream: ShardStream,
    tx: UnboundedSender<Message>,
}

impl SocketForwarder {
    /// Nothing for this long on either side means the connection is stuck.
    const TIMEOUT: Duration = Duration::from_secs(90);

    /// Create a forwarder plus the channels to talk to it.
    pub(crate) fn new(
        stream: ShardStream,
    ) -> (Self, UnboundedReceiver<Message>, UnboundedSender<Message>) {
        let (to_user, from_forwarder) = mpsc::unbounded_channel();
        let (to_forwarder, from_user) = mpsc::unbounded_channel();

        (
            Self {
                rx: from_user,
                stream,
                tx: to_user,
            },
            from_forwarder,
            to_forwarder,
        )
    }

    pub(crate) async fn run(mut self) {
        loop {
            match timeout(Self::TIMEOUT, self.next()).await {
                Ok(Some(Direction::Outgoing(message))) => {
                    let is_close = matches!(message, Message::Close(_));

                    if self.stream.send(message).await.is_err() {
                        break;
                    }

                    if is_close {
                        let _ = self.stream.flush().await;
                    }
                }
                Ok(Some(Direction::Incoming(message))) => {
                    if self.tx.send(message).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        tracing::debug!("socket forwarder ending");
        let _ = self.stream.close(None).await;
    }

    /// Next message in either direction; `None` once both sides are done.
    async fn next(&mut self) -> Option<Direction> {
        tokio::select! {
            maybe = self.rx.recv() => maybe.map(Direction::Outgoing),
            maybe = self.stream.next() => match maybe {
                Some(Ok(message)) => Some(Direction::Incoming(message)),
                Some(Err(source)) => {
                    tracing::debug!("socket errored: {source}");

                    None
                }
                None => None,
            },
        }
    }
}

enum Direction {
    Incoming(Message),
    Outgoing(Message),
}
