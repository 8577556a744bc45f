//! Connector selection based on enabled TLS features.

use hyper::client::HttpConnector;

#[cfg(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))]
pub(crate) type Connector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(all(
    feature = "native",
    not(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))
))]
pub(crate) type Connector = hyper_tls::HttpsConnector<HttpConnector>;
#[cfg(not(any(
    feature = "native",
    feature = "rustls-native-roots",
    feature = "rustls-webpki-roots"
)))]
pub(crate) type Connector = HttpConnector;

/// Create a connector for the enabled TLS backend.
pub(crate) fn create() -> Connector {
    #[cfg(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))]
    {
        let builder = hyper_rustls::HttpsConnectorBuilder::new();

        #[cfg(feature = "rustls-native-roots")]
        let builder = builder.with_native_roots();
        #[cfg(all(feature = "rustls-webpki-roots", not(feature = "rustls-native-roots")))]
        let builder = builder.with_webpki_roots();

        builder
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build()
    }

    #[cfg(all(
        feature = "native",
        not(any(feature = "rustls-native-roots", feature = "rustls-webpki-roots"))
    ))]
    {
        hyper_tls::HttpsConnector::new()
    }

    #[cfg(not(any(
        feature = "native",
        feature = "rustls-native-roots",
        feature = "rustls-webpki-roots"
    )))]
    {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        connector
    }
}
