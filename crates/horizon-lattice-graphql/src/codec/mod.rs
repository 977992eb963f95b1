//! Wire-format codecs for the subscription socket.
//!
//! A [`MessageCodec`] turns [`ClientMessage`]s into text frames and text
//! frames into [`ServerMessage`]s. Codecs are chosen per backend: most
//! servers use [`DefaultCodec`], while AWS AppSync needs [`AppSyncCodec`],
//! which signs every `start` frame and rewrites the handshake URL.
//!
//! Decoding is the same for every codec; only the outbound side and the
//! handshake URL differ.

mod appsync;

pub use appsync::{AppSyncCodec, amz_date};

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, QueryPayload, ServerMessage};

/// Subprotocol negotiated during the websocket upgrade.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Encodes and decodes subscription protocol frames.
pub trait MessageCodec: Send + Sync + fmt::Debug {
    /// Encode an outbound message as a text frame.
    fn encode(&self, message: &ClientMessage) -> Result<String>;

    /// Decode an inbound text frame.
    fn decode(&self, text: &str) -> Result<ServerMessage> {
        ServerMessage::from_json(text)
    }

    /// The URL the socket connects to for the given GraphQL endpoint.
    ///
    /// Called once, before the handshake.
    fn connection_url(&self, endpoint: &Url) -> Result<Url> {
        websocket_url(endpoint)
    }

    /// Value of the `Sec-WebSocket-Protocol` request header.
    fn subprotocol(&self) -> &str {
        GRAPHQL_WS_PROTOCOL
    }

    /// Whether the server answers each `start` with a `start_ack` frame.
    ///
    /// When it does not, a `start` frame counts as acknowledged once it has
    /// been written to the socket.
    fn acknowledges_start(&self) -> bool {
        false
    }
}

/// The envelope shared by every outbound frame.
#[derive(Serialize)]
pub(crate) struct Frame<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<P>,
}

impl<'a, P: Serialize> Frame<'a, P> {
    pub(crate) fn new(kind: &'static str, id: Option<&'a str>, payload: Option<P>) -> Self {
        Self { kind, id, payload }
    }

    pub(crate) fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ClientError::Request(format!("failed to encode frame: {e}")))
    }
}

fn bare_frame(kind: &'static str, id: Option<&str>) -> Result<String> {
    Frame::<()>::new(kind, id, None).to_json()
}

/// Plain `graphql-ws` framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl DefaultCodec {
    fn encode_start(id: &str, payload: &QueryPayload) -> Result<String> {
        Frame::new("start", Some(id), Some(payload)).to_json()
    }
}

impl MessageCodec for DefaultCodec {
    fn encode(&self, message: &ClientMessage) -> Result<String> {
        match message {
            ClientMessage::ConnectionInit => bare_frame(message.kind(), None),
            ClientMessage::Start { id, payload } => Self::encode_start(id, payload),
            ClientMessage::Stop { id } => bare_frame(message.kind(), Some(id)),
            ClientMessage::ConnectionTerminate => bare_frame(message.kind(), None),
        }
    }
}

/// Switch an `http(s)` endpoint to the matching `ws(s)` scheme.
pub fn websocket_url(endpoint: &Url) -> Result<Url> {
    let mut url = endpoint.clone();
    switch_to_socket_scheme(&mut url)?;
    Ok(url)
}

pub(crate) fn switch_to_socket_scheme(url: &mut Url) -> Result<()> {
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ClientError::Request(format!(
                "unsupported endpoint scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Request(format!("cannot switch '{url}' to {scheme}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::GraphQLRequest;
    use serde_json::json;

    #[test]
    fn test_default_encoding_matches_wire_format() {
        let codec = DefaultCodec;

        assert_eq!(
            codec.encode(&ClientMessage::ConnectionInit).unwrap(),
            r#"{"type":"connection_init"}"#
        );
        assert_eq!(
            codec.encode(&ClientMessage::ConnectionTerminate).unwrap(),
            r#"{"type":"connection_terminate"}"#
        );
        assert_eq!(
            codec.encode(&ClientMessage::stop("123")).unwrap(),
            r#"{"type":"stop","id":"123"}"#
        );

        let request = GraphQLRequest::subscription("select")
            .variables(json!({"room": "a"}))
            .unwrap();
        assert_eq!(
            codec.encode(&ClientMessage::start("123", request)).unwrap(),
            r#"{"type":"start","id":"123","payload":{"query":"select","variables":{"room":"a"},"operationName":null}}"#
        );
    }

    #[test]
    fn test_encoded_messages_parse_back() {
        let request = GraphQLRequest::subscription("subscription { a }")
            .variables(json!({"room": "a"}))
            .unwrap();
        let messages = [
            ClientMessage::ConnectionInit,
            ClientMessage::start("abc", request),
            ClientMessage::stop("abc"),
            ClientMessage::ConnectionTerminate,
        ];

        for message in messages {
            let text = DefaultCodec.encode(&message).unwrap();
            assert_eq!(ClientMessage::from_json(&text).unwrap(), message, "{text}");
        }
    }

    #[test]
    fn test_default_decode() {
        let codec = DefaultCodec;
        assert_eq!(
            codec.decode(r#"{"type":"connection_ack"}"#).unwrap(),
            ServerMessage::ConnectionAck
        );
        assert!(codec.decode(r#"{"type":"GQL_DATA"}"#).is_err());
    }

    #[test]
    fn test_websocket_url() {
        let url = Url::parse("https://api.example.com/graphql").unwrap();
        assert_eq!(
            websocket_url(&url).unwrap().as_str(),
            "wss://api.example.com/graphql"
        );

        let url = Url::parse("http://localhost:4000/graphql").unwrap();
        assert_eq!(
            websocket_url(&url).unwrap().as_str(),
            "ws://localhost:4000/graphql"
        );

        let url = Url::parse("ftp://example.com/").unwrap();
        assert!(websocket_url(&url).is_err());
    }

    #[test]
    fn test_default_codec_properties() {
        assert_eq!(DefaultCodec.subprotocol(), "graphql-ws");
        assert!(!DefaultCodec.acknowledges_start());
    }
}
