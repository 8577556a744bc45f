//! Framing and message types of the coordination protocol.
//!
//! Messages travel as length-prefixed JSON: a big-endian `u32` frame length
//! followed by that many bytes of JSON. Every request carries an `id` the
//! response echoes back.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{Error as IoError, ErrorKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// A request to either coordination service.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Ask the rate-limit coordinator whether a request may proceed.
    Authorize {
        /// HTTP method name.
        method: String,
        /// Route of the request.
        path: String,
    },
    /// Feed observed ratelimit state back to the coordinator.
    Update {
        /// HTTP method name.
        method: String,
        /// Route of the request.
        path: String,
        /// Whether the response flagged a global violation.
        global: bool,
        /// Bucket ID from the response, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
        /// Bucket limit, if present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        /// Remaining requests, if present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining: Option<u64>,
        /// Milliseconds until reset, if present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reset_after: Option<u64>,
    },
    /// Take the identify lock for a lease duration.
    Acquire {
        /// Requested lease in milliseconds.
        duration_ms: u64,
    },
    /// Extend a held identify lock.
    Renew {
        /// Token returned by the grant.
        token: String,
        /// Requested lease in milliseconds.
        duration_ms: u64,
    },
    /// Let a held identify lock go.
    Release {
        /// Token returned by the grant.
        token: String,
    },
}

/// A response to a [`Request`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    /// Answer to [`Request::Authorize`].
    Authorized {
        /// Zero to proceed now, otherwise the minimum wait in milliseconds.
        reset_after_ms: u64,
    },
    /// Answer to [`Request::Update`].
    Updated,
    /// Answer to [`Request::Acquire`].
    Acquired {
        /// Whether the lock was taken.
        granted: bool,
        /// Token to renew or release with; empty when not granted.
        token: String,
        /// When the lease (ours or the current holder's) expires, as unix
        /// milliseconds.
        expires_at: u64,
    },
    /// Answer to [`Request::Renew`].
    Renewed {
        /// Whether the lease was extended.
        granted: bool,
        /// When the lease expires, as unix milliseconds.
        expires_at: u64,
    },
    /// Answer to [`Request::Release`].
    Released,
    /// The request failed server-side.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// A framed request with its correlation ID.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RequestFrame {
    /// Correlation ID echoed by the response.
    pub id: u64,
    /// The request itself.
    #[serde(flatten)]
    pub request: Request,
}

/// A framed response with its correlation ID.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResponseFrame {
    /// Correlation ID of the request being answered.
    pub id: u64,
    /// The response itself.
    #[serde(flatten)]
    pub response: Response,
}

/// Read one frame, or `None` on a clean end of stream.
pub async fn read_frame<T: DeserializeOwned>(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<Option<T>, IoError> {
    let mut len = [0u8; 4];

    match stream.read_exact(&mut len).await {
        Ok(_) => {}
        Err(source) if source.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(source) => return Err(source),
    }

    let len = u32::from_be_bytes(len);
    if len > MAX_FRAME_LEN {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }

    let mut buffer = vec![0u8; len as usize];
    stream.read_exact(&mut buffer).await?;

    serde_json::from_slice(&buffer)
        .map(Some)
        .map_err(|source| IoError::new(ErrorKind::InvalidData, source))
}

/// Write one frame.
pub async fn write_frame<T: Serialize>(
    stream: &mut (impl AsyncWrite + Unpin),
    value: &T,
) -> Result<(), IoError> {
    let bytes = serde_json::to_vec(value).map_err(|source| IoError::new(ErrorKind::InvalidData, source))?;

    let len = u32::try_from(bytes.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "frame too large"))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::{read_frame, write_frame, Request, RequestFrame, Response, ResponseFrame};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Request: Clone, Debug, PartialEq, Send, Sync);
    assert_impl_all!(Response: Clone, Debug, PartialEq, Send, Sync);

    #[test]
    fn tagged_wire_form() {
        let frame = RequestFrame {
            id: 7,
            request: Request::Authorize {
                method: "GET".to_owned(),
                path: "channels/1".to_owned(),
            },
        };

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(7, value["id"]);
        assert_eq!("authorize", value["op"]);
        assert_eq!("GET", value["method"]);
    }

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let frame = ResponseFrame {
            id: 3,
            response: Response::Acquired {
                granted: true,
                token: "cafe".to_owned(),
                expires_at: 12345,
            },
        };

        write_frame(&mut client, &frame).await.unwrap();

        let read: ResponseFrame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(frame, read);

        // Closing the writer ends the stream cleanly.
        drop(client);
        assert!(read_frame::<ResponseFrame>(&mut server)
            .await
            .unwrap()
            .is_none());
    }
}
