//! Parse typed ratelimit information from response headers.
//!
//! Feeding parsed headers back into a [`Ratelimiter`] is how budgets are
//! learned; a response with no ratelimit headers parses to
//! [`RatelimitHeaders::None`] and is a no-op downstream.
//!
//! [`Ratelimiter`]: super::Ratelimiter

use std::{
    error::Error,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    str::{self, Utf8Error},
};

/// Parsing a header value failed.
#[derive(Debug)]
pub struct HeaderParsingError {
    /// Detailed reason why the headers failed to be parsed.
    pub(crate) kind: HeaderParsingErrorType,
    /// Original error leading up to this one.
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl HeaderParsingError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &HeaderParsingErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (HeaderParsingErrorType, Option<Box<dyn Error + Send + Sync>>) {
        (self.kind, self.source)
    }

    /// Create a new error because a header is missing in the response.
    pub(crate) fn missing(name: HeaderName) -> Self {
        Self {
            kind: HeaderParsingErrorType::Missing { name },
            source: None,
        }
    }

    /// Create a new error because a header is not valid UTF-8.
    pub(crate) fn not_utf8(name: HeaderName, value: Vec<u8>, source: Utf8Error) -> Self {
        Self {
            kind: HeaderParsingErrorType::NotUtf8 { name, value },
            source: Some(Box::new(source)),
        }
    }
}

impl Display for HeaderParsingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            HeaderParsingErrorType::Missing { name } => {
                f.write_str("at least one header, '")?;
                f.write_str(name.name())?;

                f.write_str("', is missing")
            }
            HeaderParsingErrorType::NotUtf8 { name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' is not UTF-8 valid: ")?;

                Debug::fmt(value, f)
            }
            HeaderParsingErrorType::Parsing { kind, name, value } => {
                f.write_str("header '")?;
                f.write_str(name.name())?;
                f.write_str("' can not be parsed as a ")?;
                f.write_str(kind.name())?;
                f.write_str(": '")?;
                f.write_str(value)?;

                f.write_str("'")
            }
        }
    }
}

impl Error for HeaderParsingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`HeaderParsingError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum HeaderParsingErrorType {
    /// Expected header is missing.
    Missing {
        /// Name of the header that should be present in the list.
        name: HeaderName,
    },
    /// Header value is not UTF-8 valid.
    NotUtf8 {
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: Vec<u8>,
    },
    /// Header value is not of the expected type.
    Parsing {
        /// Type of header value expected.
        kind: HeaderType,
        /// Name of the header.
        name: HeaderName,
        /// Value of the header.
        value: String,
    },
}

/// Typed name of a ratelimit header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderName {
    /// Opaque ID of the bucket a route belongs to.
    Bucket,
    /// Whether the response signals a global ratelimit violation.
    Global,
    /// Maximum requests allotted in the bucket.
    Limit,
    /// Remaining requests allotted.
    Remaining,
    /// How long until the bucket resets.
    ResetAfter,
    /// How long until a request can be tried again.
    RetryAfter,
}

impl HeaderName {
    /// Lowercased name for the bucket header.
    pub const BUCKET: &'static str = "x-ratelimit-bucket";

    /// Lowercased name for the global header.
    pub const GLOBAL: &'static str = "x-ratelimit-global";

    /// Lowercased name for the limit header.
    pub const LIMIT: &'static str = "x-ratelimit-limit";

    /// Lowercased name for the remaining header.
    pub const REMAINING: &'static str = "x-ratelimit-remaining";

    /// Lowercased name for the reset-after header.
    pub const RESET_AFTER: &'static str = "x-ratelimit-reset-after";

    /// Lowercased name for the retry-after header.
    // It's correct for this to not have the `x-ratelimit-` prefix.
    pub const RETRY_AFTER: &'static str = "retry-after";

    /// Lowercased name of the header.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bucket => Self::BUCKET,
            Self::Global => Self::GLOBAL,
            Self::Limit => Self::LIMIT,
            Self::Remaining => Self::REMAINING,
            Self::ResetAfter => Self::RESET_AFTER,
            Self::RetryAfter => Self::RETRY_AFTER,
        }
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Expected type of a header value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum HeaderType {
    /// Type of header value is a bool.
    Bool,
    /// Type of header value is a float.
    Float,
    /// Type of header value is an integer.
    Integer,
}

impl HeaderType {
    /// Name of the type of header.
    const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Integer => "integer",
        }
    }
}

impl Display for HeaderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Information about a route's bucket present in response headers.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Present {
    /// Opaque bucket ID, if any.
    bucket: Option<String>,
    /// Total number of requests allotted to the bucket.
    limit: u64,
    /// Remaining number of requests.
    remaining: u64,
    /// Milliseconds until the bucket resets.
    reset_after: u64,
}

impl Present {
    /// Create present headers from their parts.
    ///
    /// Primarily useful to feed observed state into a ratelimiter without a
    /// response at hand, such as over a coordination protocol.
    #[must_use]
    pub const fn new(
        bucket: Option<String>,
        limit: u64,
        remaining: u64,
        reset_after: u64,
    ) -> Self {
        Self {
            bucket,
            limit,
            remaining,
            reset_after,
        }
    }

    /// Immutable reference to the bucket ID.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Consume the headers, returning the owned bucket ID if available.
    #[allow(clippy::missing_const_for_fn)]
    #[must_use]
    pub fn into_bucket(self) -> Option<String> {
        self.bucket
    }

    /// Total number of requests allotted to the bucket.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Remaining number of requests.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Milliseconds until the bucket resets.
    #[must_use]
    pub const fn reset_after(&self) -> u64 {
        self.reset_after
    }
}

/// Parsed ratelimit headers.
///
/// A response either signals a global ratelimit violation, carries bucket
/// information, or carries no ratelimit information at all.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum RatelimitHeaders {
    /// The whole application is ratelimited.
    GlobalLimited {
        /// Milliseconds before retrying.
        retry_after: u64,
    },
    /// No ratelimit headers present.
    None,
    /// Information about the route's bucket is available.
    Present(Present),
}

impl RatelimitHeaders {
    /// Whether the headers are a global ratelimit violation.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::GlobalLimited { .. })
    }

    /// Whether there are no ratelimit headers.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether the headers carry bucket information.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Parse headers from an iterator of name-value pairs.
    ///
    /// Header names must be lowercased; values *may* be UTF-8 valid and are
    /// checked before parsing. Names outside the ratelimit set are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a required header is missing or a header value is
    /// of an invalid type.
    pub fn from_pairs<'a>(
        headers: impl Iterator<Item = (&'a str, &'a [u8])>,
    ) -> Result<Self, HeaderParsingError> {
        let mut bucket = None;
        let mut global = false;
        let mut limit = None;
        let mut remaining = None;
        let mut reset_after = None;
        let mut retry_after = None;

        for (name, value) in headers {
            match name {
                HeaderName::BUCKET => {
                    bucket.replace(header_str(HeaderName::Bucket, value)?);
                }
                HeaderName::GLOBAL => {
                    global = header_bool(HeaderName::Global, value)?;
                }
                HeaderName::LIMIT => {
                    limit.replace(header_int(HeaderName::Limit, value)?);
                }
                HeaderName::REMAINING => {
                    remaining.replace(header_int(HeaderName::Remaining, value)?);
                }
                HeaderName::RESET_AFTER => {
                    // Seconds with millisecond precision; scheduling wants
                    // integer milliseconds.
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let millis =
                        (header_float(HeaderName::ResetAfter, value)? * 1000.).ceil() as u64;

                    reset_after.replace(millis);
                }
                HeaderName::RETRY_AFTER => {
                    let seconds = header_int(HeaderName::RetryAfter, value)?;

                    retry_after.replace(seconds * 1000);
                }
                _ => continue,
            }
        }

        if global {
            let retry_after =
                retry_after.ok_or_else(|| HeaderParsingError::missing(HeaderName::RetryAfter))?;

            return Ok(Self::GlobalLimited { retry_after });
        }

        // No value seen means the route carries no ratelimit at all.
        if bucket.is_none() && limit.is_none() && remaining.is_none() && reset_after.is_none() {
            return Ok(Self::None);
        }

        Ok(Self::Present(Present {
            bucket: bucket.map(Into::into),
            limit: limit.ok_or_else(|| HeaderParsingError::missing(HeaderName::Limit))?,
            remaining: remaining
                .ok_or_else(|| HeaderParsingError::missing(HeaderName::Remaining))?,
            reset_after: reset_after
                .ok_or_else(|| HeaderParsingError::missing(HeaderName::ResetAfter))?,
        }))
    }
}

/// Parse a value as a boolean.
fn header_bool(name: HeaderName, value: &[u8]) -> Result<bool, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Bool,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be a float.
fn header_float(name: HeaderName, value: &[u8]) -> Result<f64, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Float,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be an integer.
fn header_int(name: HeaderName, value: &[u8]) -> Result<u64, HeaderParsingError> {
    let text = header_str(name, value)?;

    text.parse().map_err(|source| HeaderParsingError {
        kind: HeaderParsingErrorType::Parsing {
            kind: HeaderType::Integer,
            name,
            value: text.to_owned(),
        },
        source: Some(Box::new(source)),
    })
}

/// Parse a value expected to be a UTF-8 valid string.
fn header_str(name: HeaderName, value: &[u8]) -> Result<&str, HeaderParsingError> {
    str::from_utf8(value).map_err(|source| HeaderParsingError::not_utf8(name, value.to_owned(), source))
}

#[cfg(test)]
mod tests {
    use super::{
        HeaderName, HeaderParsingError, HeaderParsingErrorType, HeaderType, Present,
        RatelimitHeaders,
    };
    use static_assertions::{assert_fields, assert_impl_all};
    use std::{
        error::Error,
        fmt::{Debug, Display},
    };

    assert_fields!(HeaderParsingErrorType::Missing: name);
    assert_fields!(HeaderParsingErrorType::NotUtf8: name, value);
    assert_fields!(HeaderParsingErrorType::Parsing: kind, name, value);
    assert_impl_all!(HeaderName: Clone, Copy, Debug, Display, Eq, PartialEq, Send, Sync);
    assert_impl_all!(HeaderParsingError: Error, Send, Sync);
    assert_impl_all!(HeaderType: Clone, Copy, Debug, Display, Eq, PartialEq, Send, Sync);
    assert_impl_all!(Present: Clone, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(RatelimitHeaders: Clone, Debug, Send, Sync);

    /// Write a `Present` back to the header pairs it parses from.
    fn serialize(present: &Present) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();

        if let Some(bucket) = present.bucket() {
            pairs.push((HeaderName::BUCKET, bucket.to_owned()));
        }

        pairs.push((HeaderName::LIMIT, present.limit().to_string()));
        pairs.push((HeaderName::REMAINING, present.remaining().to_string()));
        #[allow(clippy::cast_precision_loss)]
        pairs.push((
            HeaderName::RESET_AFTER,
            format!("{:.3}", present.reset_after() as f64 / 1000.),
        ));

        pairs
    }

    #[test]
    fn present() {
        let headers = [
            (HeaderName::BUCKET, "d721dea6054f6322373d361f98e5c38b"),
            (HeaderName::LIMIT, "10"),
            (HeaderName::REMAINING, "9"),
            (HeaderName::RESET_AFTER, "64.57"),
        ];

        let parsed =
            RatelimitHeaders::from_pairs(headers.iter().map(|(k, v)| (*k, v.as_bytes()))).unwrap();

        assert!(matches!(
            &parsed,
            RatelimitHeaders::Present(p)
            if p.bucket() == Some("d721dea6054f6322373d361f98e5c38b")
                && p.limit() == 10
                && p.remaining() == 9
                && p.reset_after() == 64_570
        ));
    }

    #[test]
    fn global() {
        let headers = [
            (HeaderName::GLOBAL, "true"),
            (HeaderName::RETRY_AFTER, "487"),
        ];

        let parsed =
            RatelimitHeaders::from_pairs(headers.iter().map(|(k, v)| (*k, v.as_bytes()))).unwrap();

        assert!(matches!(
            parsed,
            RatelimitHeaders::GlobalLimited { retry_after } if retry_after == 487_000
        ));
    }

    #[test]
    fn none() {
        let headers = [("content-type", "application/json")];

        let parsed =
            RatelimitHeaders::from_pairs(headers.iter().map(|(k, v)| (*k, v.as_bytes()))).unwrap();

        assert!(parsed.is_none());
    }

    #[test]
    fn missing_required() {
        let headers = [(HeaderName::LIMIT, "10")];

        let err = RatelimitHeaders::from_pairs(headers.iter().map(|(k, v)| (*k, v.as_bytes())))
            .unwrap_err();

        assert!(matches!(
            err.kind(),
            HeaderParsingErrorType::Missing { name: HeaderName::Remaining }
        ));
    }

    #[test]
    fn malformed_integer() {
        let headers = [
            (HeaderName::LIMIT, "ten"),
            (HeaderName::REMAINING, "9"),
            (HeaderName::RESET_AFTER, "1.0"),
        ];

        let err = RatelimitHeaders::from_pairs(headers.iter().map(|(k, v)| (*k, v.as_bytes())))
            .unwrap_err();

        assert!(matches!(
            err.kind(),
            HeaderParsingErrorType::Parsing { kind: HeaderType::Integer, name: HeaderName::Limit, .. }
        ));
    }

    #[test]
    fn round_trip() {
        let original = Present::new(Some("abcd1234".to_owned()), 5, 3, 1250);
        let pairs = serialize(&original);

        let reparsed =
            RatelimitHeaders::from_pairs(pairs.iter().map(|(k, v)| (*k, v.as_bytes()))).unwrap();

        assert!(matches!(reparsed, RatelimitHeaders::Present(p) if p == original));
    }
}
