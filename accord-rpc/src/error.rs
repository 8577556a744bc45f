//! Errors of the coordination protocol.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Performing a coordination call failed.
#[derive(Debug)]
pub struct RpcError {
    pub(crate) kind: RpcErrorType,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
}

impl RpcError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &RpcErrorType {
        &self.kind
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (RpcErrorType, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }

    pub(crate) fn new(kind: RpcErrorType) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn with_source(kind: RpcErrorType, source: Box<dyn StdError + Send + Sync>) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }
}

impl Display for RpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            RpcErrorType::Connecting { address } => {
                f.write_str("connecting to the coordinator at ")?;
                f.write_str(address)?;

                f.write_str(" failed")
            }
            RpcErrorType::Io => f.write_str("reading or writing a frame failed"),
            RpcErrorType::Protocol => f.write_str("the coordinator answered out of protocol"),
            RpcErrorType::RequestDropped => {
                f.write_str("the connection task dropped the request")
            }
            RpcErrorType::Response { message } => {
                f.write_str("the coordinator reported an error: ")?;

                f.write_str(message)
            }
        }
    }
}

impl StdError for RpcError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`RpcError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum RpcErrorType {
    /// Establishing the connection failed.
    Connecting {
        /// Address of the coordinator.
        address: String,
    },
    /// A frame could not be read or written.
    Io,
    /// The coordinator answered with an unexpected message or ID.
    Protocol,
    /// The connection task is gone.
    RequestDropped,
    /// The coordinator reported a server-side error.
    Response {
        /// Human-readable reason.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::{RpcError, RpcErrorType};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{error::Error, fmt::Debug};

    assert_fields!(RpcErrorType::Connecting: address);
    assert_fields!(RpcErrorType::Response: message);
    assert_impl_all!(RpcError: Debug, Error, Send, Sync);
    assert_impl_all!(RpcErrorType: Debug, Send, Sync);
}
