//! Error types for the GraphQL client.

use crate::response::ErrorData;

/// Errors produced by queries, mutations and subscriptions.
///
/// The type is `Clone` because a single transport failure is fanned out to
/// every live subscription on the connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Socket open, send or receive failed, or the server went away.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame or payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server reported one or more GraphQL errors.
    #[error("GraphQL error: {}", join_messages(.0))]
    Response(Vec<ErrorData>),

    /// The request could not be encoded or prepared locally.
    #[error("Request error: {0}")]
    Request(String),

    /// HTTP error status (4xx or 5xx) on the query path.
    #[error("HTTP {status}{}", status_suffix(.message))]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Response body, if it could be read.
        message: Option<String>,
    },

    /// Operation attempted on a connection that has terminated.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A connect or handshake deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ClientError {
    /// The server-reported errors, if this is a response error.
    pub fn response_errors(&self) -> Option<&[ErrorData]> {
        match self {
            Self::Response(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether the error came from the socket or the HTTP transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::ConnectionClosed
        )
    }
}

fn status_suffix(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(": {msg}"),
        None => String::new(),
    }
}

fn join_messages(errors: &[ErrorData]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::Request(format!("invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<http::header::InvalidHeaderName> for ClientError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::Request(format!("invalid header: {err}"))
    }
}

impl From<http::header::InvalidHeaderValue> for ClientError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::Request(format!("invalid header: {err}"))
    }
}

/// A specialized Result type for GraphQL client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
