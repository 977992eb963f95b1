//! Wire messages of the `graphql-ws` subscription protocol.
//!
//! Every frame is a JSON object discriminated by its `type` field:
//!
//! | direction | `type`                                                      |
//! |-----------|-------------------------------------------------------------|
//! | client    | `connection_init`, `start`, `stop`, `connection_terminate`  |
//! | server    | `connection_ack`, `connection_error`, `start_ack`, `data`, `error`, `complete`, `ka` |
//!
//! Frames are first read into a [`RawFrame`] so that the discriminator can be
//! inspected before any variant-specific field is decoded.

mod client;
mod server;

pub use client::{ClientMessage, QueryPayload};
pub use server::{MessagePayload, ServerMessage};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// A frame with only its envelope decoded.
#[derive(Debug, Deserialize)]
pub(crate) struct RawFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl RawFrame {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ClientError::Decode(format!("malformed frame: {e}")))
    }

    pub(crate) fn require_id(&mut self) -> Result<String> {
        self.id
            .take()
            .ok_or_else(|| ClientError::Decode(format!("'{}' frame without id", self.kind)))
    }

    pub(crate) fn require_payload(&mut self) -> Result<Value> {
        self.payload
            .take()
            .ok_or_else(|| ClientError::Decode(format!("'{}' frame without payload", self.kind)))
    }
}
