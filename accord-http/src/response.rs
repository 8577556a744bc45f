//! A response from the service's REST API.

use crate::error::{Error, ErrorType};
use serde::de::DeserializeOwned;

/// A successful response: the status code and the raw body.
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) bytes: Vec<u8>,
    pub(crate) status: u16,
}

impl Response {
    /// Status code of the response.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Raw bytes of the response body.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Deserialize the body as JSON into a model.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorType::Json`] error type if deserializing fails.
    pub fn model<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.bytes)
            .map_err(|source| Error::with_source(ErrorType::Json, Box::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::Response;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Response: Clone, Debug, Send, Sync);

    #[test]
    fn model_deserializes() {
        let response = Response {
            bytes: br#"{"url": "wss://gateway.example"}"#.to_vec(),
            status: 200,
        };

        #[derive(serde::Deserialize)]
        struct Gateway {
            url: String,
        }

        let gateway: Gateway = response.model().unwrap();
        assert_eq!("wss://gateway.example", gateway.url);
    }
}
