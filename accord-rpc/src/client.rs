//! Client half of the coordination protocol.

use crate::{
    error::{RpcError, RpcErrorType},
    protocol::{read_frame, write_frame, Request, RequestFrame, Response, ResponseFrame},
};
use std::sync::Arc;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};

/// A pending call handed to the connection task.
#[derive(Debug)]
struct Command {
    request: Request,
    tx: oneshot::Sender<Result<Response, RpcError>>,
}

/// Client of a coordination server.
///
/// Connects lazily: the TCP connection is established on the first call and
/// re-established once per call after a failure. Calls on one client are
/// processed in order; clone the client for independent call streams.
#[derive(Clone, Debug)]
pub struct RpcClient {
    address: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
}

impl RpcClient {
    /// Create a client for a coordinator address.
    ///
    /// No connection is attempted until the first call.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        let address: Arc<str> = address.into().into();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(run(Arc::clone(&address), rx));

        Self { address, tx }
    }

    /// Address of the coordinator.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Perform one call against the coordinator.
    pub(crate) async fn call(&self, request: Request) -> Result<Response, RpcError> {
        let (tx, rx) = oneshot::channel();

        self.tx
            .send(Command { request, tx })
            .map_err(|_| RpcError::new(RpcErrorType::RequestDropped))?;

        rx.await
            .map_err(|_| RpcError::new(RpcErrorType::RequestDropped))?
    }
}

/// Connection task: serializes calls over one TCP stream, reconnecting at
/// most once per call.
async fn run(address: Arc<str>, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut stream: Option<TcpStream> = None;
    let mut next_id: u64 = 0;

    while let Some(command) = rx.recv().await {
        let id = next_id;
        next_id = next_id.wrapping_add(1);

        let result = roundtrip(&address, &mut stream, id, &command.request).await;

        if result.is_err() {
            stream = None;
        }

        let _ = command.tx.send(result);
    }
}

/// Send one request and wait for its response, reconnecting once if the
/// stream broke.
async fn roundtrip(
    address: &str,
    stream: &mut Option<TcpStream>,
    id: u64,
    request: &Request,
) -> Result<Response, RpcError> {
    for attempt in 0..2u8 {
        if stream.is_none() {
            let connected = TcpStream::connect(address).await.map_err(|source| {
                RpcError::with_source(
                    RpcErrorType::Connecting {
                        address: address.to_owned(),
                    },
                    Box::new(source),
                )
            })?;

            tracing::debug!(address, "connected to coordinator");

            stream.replace(connected);
        }

        let connection = stream.as_mut().expect("stream was just set");

        let io = async {
            write_frame(
                connection,
                &RequestFrame {
                    id,
                    request: request.clone(),
                },
            )
            .await?;

            read_frame::<ResponseFrame>(connection).await
        };

        match io.await {
            Ok(Some(frame)) => {
                if frame.id != id {
                    return Err(RpcError::new(RpcErrorType::Protocol));
                }

                if let Response::Error { message } = frame.response {
                    return Err(RpcError::new(RpcErrorType::Response { message }));
                }

                return Ok(frame.response);
            }
            Ok(None) => {
                // Server went away mid-call; retry on a fresh connection.
                stream.take();

                if attempt == 1 {
                    return Err(RpcError::new(RpcErrorType::Io));
                }
            }
            Err(source) => {
                stream.take();

                if attempt == 1 {
                    return Err(RpcError::with_source(RpcErrorType::Io, Box::new(source)));
                }
            }
        }

        tracing::debug!(address, "coordinator connection lost, retrying once");
    }

    unreachable!("roundtrip returns within two attempts")
}
