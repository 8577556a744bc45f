//! Errors returned by the REST client.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Performing a request failed.
#[derive(Debug)]
pub struct Error {
    pub(crate) kind: ErrorType,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ErrorType, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }

    pub(crate) fn new(kind: ErrorType) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn with_source(
        kind: ErrorType,
        source: Box<dyn StdError + Send + Sync>,
    ) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ErrorType::BuildingRequest => f.write_str("failed to build the request"),
            ErrorType::ChunkingResponse => f.write_str("failed to read the response body"),
            ErrorType::Deadline => f.write_str("request deadline elapsed"),
            ErrorType::Json => f.write_str("json serialization or deserialization failed"),
            ErrorType::RatelimitBackend => {
                f.write_str("the ratelimit backend failed to authorize the request")
            }
            ErrorType::RatelimitExhausted { attempts } => {
                f.write_str("request was ratelimited by the service ")?;
                Display::fmt(attempts, f)?;

                f.write_str(" times")
            }
            ErrorType::RequestError => f.write_str("sending the request failed"),
            ErrorType::Response { status } => {
                f.write_str("response indicates failure: status ")?;

                Display::fmt(status, f)
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`Error`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorType {
    /// The request could not be built.
    BuildingRequest,
    /// The response body could not be read.
    ChunkingResponse,
    /// The caller-supplied deadline elapsed before the request completed.
    Deadline,
    /// Serializing a body or deserializing a response as JSON failed.
    Json,
    /// The ratelimit backend failed and no fallback was available.
    RatelimitBackend,
    /// The service responded with a ratelimit violation repeatedly.
    RatelimitExhausted {
        /// How many 429 responses were received.
        attempts: u64,
    },
    /// The request failed at the transport level.
    ///
    /// Transport failures are not retried; the caller decides.
    RequestError,
    /// The response indicates a failure.
    Response {
        /// Status code of the response.
        status: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorType};
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{error::Error as StdError, fmt::Debug};

    assert_fields!(ErrorType::RatelimitExhausted: attempts);
    assert_fields!(ErrorType::Response: status);
    assert_impl_all!(Error: Debug, StdError, Send, Sync);
    assert_impl_all!(ErrorType: Debug, Send, Sync);

    #[test]
    fn display() {
        let error = Error::new(ErrorType::RatelimitExhausted { attempts: 3 });

        assert_eq!(
            "request was ratelimited by the service 3 times",
            error.to_string()
        );
    }
}
