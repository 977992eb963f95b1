//! Client to server messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RawFrame;
use crate::error::{ClientError, Result};
use crate::request::GraphQLRequest;

/// The operation carried by a `start` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    /// The GraphQL document.
    pub query: String,
    /// Operation variables.
    pub variables: Value,
    /// Always serialized, as `null` when unset.
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,
}

impl From<GraphQLRequest> for QueryPayload {
    fn from(request: GraphQLRequest) -> Self {
        Self {
            query: request.query,
            variables: request.variables,
            operation_name: None,
        }
    }
}

/// A message sent from the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Opens the protocol session. Sent directly, never queued.
    ConnectionInit,
    /// Starts a subscription under `id`.
    Start {
        /// Subscription id.
        id: String,
        /// The subscription operation.
        payload: QueryPayload,
    },
    /// Stops the subscription `id`.
    Stop {
        /// Subscription id.
        id: String,
    },
    /// Ends the protocol session.
    ConnectionTerminate,
}

impl ClientMessage {
    /// Build a `start` message from a request.
    pub fn start(id: impl Into<String>, request: GraphQLRequest) -> Self {
        Self::Start {
            id: id.into(),
            payload: request.into(),
        }
    }

    /// Build a `stop` message.
    pub fn stop(id: impl Into<String>) -> Self {
        Self::Stop { id: id.into() }
    }

    /// The wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::ConnectionTerminate => "connection_terminate",
        }
    }

    /// The subscription id, for `start` and `stop`.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Start { id, .. } | Self::Stop { id } => Some(id),
            Self::ConnectionInit | Self::ConnectionTerminate => None,
        }
    }

    /// Parse a client frame. Servers and test harnesses use this to read
    /// what a client sent.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut frame = RawFrame::parse(text)?;
        match frame.kind.as_str() {
            "connection_init" => Ok(Self::ConnectionInit),
            "connection_terminate" => Ok(Self::ConnectionTerminate),
            "stop" => Ok(Self::Stop {
                id: frame.require_id()?,
            }),
            "start" => {
                let id = frame.require_id()?;
                let payload = serde_json::from_value(frame.require_payload()?)
                    .map_err(|e| ClientError::Decode(format!("invalid start payload: {e}")))?;
                Ok(Self::Start { id, payload })
            }
            other => Err(ClientError::Decode(format!(
                "unknown client message type '{other}'"
            ))),
        }
    }
}
