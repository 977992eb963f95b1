//! Subscription connection configuration.

use std::time::Duration;

use http::HeaderMap;
use url::Url;

/// Extension offered during the upgrade unless configured otherwise.
pub const DEFAULT_WEBSOCKET_EXTENSIONS: &str = "x-webkit-deflate-frame";

/// Configuration for one subscription socket.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The GraphQL endpoint. The codec derives the socket URL from it.
    pub endpoint: Url,
    /// Socket URL to use instead of the codec-derived one.
    pub websocket_url: Option<Url>,
    /// Extra headers for the upgrade request.
    pub headers: HeaderMap,
    /// `Sec-WebSocket-Extensions` header value, if any.
    pub extensions: Option<String>,
    /// Deadline for the TCP connect and websocket handshake.
    pub connection_timeout: Duration,
    /// Deadline for `connection_ack` after `connection_init`. `None` waits
    /// forever.
    pub ack_timeout: Option<Duration>,
    /// Deadline for `start_ack` after a `start` frame is written, for codecs
    /// whose servers acknowledge each subscription. `None` waits forever.
    pub start_ack_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Defaults for the given endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            websocket_url: None,
            headers: HeaderMap::new(),
            extensions: Some(DEFAULT_WEBSOCKET_EXTENSIONS.to_string()),
            connection_timeout: Duration::from_secs(30),
            ack_timeout: Some(Duration::from_secs(30)),
            start_ack_timeout: Some(Duration::from_secs(30)),
        }
    }
}
