//! A request to the service's REST API.

use crate::error::{Error, ErrorType};
use accord_http_ratelimiting::{Method, Path};
use serde::Serialize;
use tokio::time::Instant;

/// A REST request: the method, the route, an optional JSON body, and an
/// optional deadline.
///
/// Routes are given relative to the API base, with or without a leading
/// slash, for example `channels/123/messages`.
#[derive(Debug)]
pub struct Request {
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) method: Method,
    pub(crate) route: String,
}

impl Request {
    /// Create a new request for a route.
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            body: None,
            deadline: None,
            method,
            route: route.into(),
        }
    }

    /// Set the raw body of the request.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);

        self
    }

    /// Serialize a value as the JSON body of the request.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::Json`] error type if the value fails to
    /// serialize.
    pub fn json(mut self, value: &impl Serialize) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(value)
            .map_err(|source| Error::with_source(ErrorType::Json, Box::new(source)))?;

        self.body = Some(bytes);

        Ok(self)
    }

    /// Set a deadline after which the request fails with
    /// [`ErrorType::Deadline`], even while waiting on a ratelimit.
    #[must_use]
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);

        self
    }

    /// Fingerprint of the request, used to match it to a budget.
    #[must_use]
    pub fn path(&self) -> Path {
        Path::new(self.method, &self.route)
    }
}

#[cfg(test)]
mod tests {
    use super::Request;
    use accord_http_ratelimiting::Method;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Request: Debug, Send, Sync);

    #[test]
    fn fingerprint_from_route() {
        let request = Request::new(Method::Post, "channels/123/messages");

        assert_eq!("channels/123/messages", request.path().route());
    }

    #[test]
    fn json_body() {
        let request = Request::new(Method::Post, "channels/1/messages")
            .json(&serde_json::json!({ "content": "hi" }))
            .unwrap();

        assert_eq!(
            Some(br#"{"content":"hi"}"#.as_slice()),
            request.body.as_deref()
        );
    }
}
