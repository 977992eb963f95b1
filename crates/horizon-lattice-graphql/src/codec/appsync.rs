//! AWS AppSync real-time framing.
//!
//! AppSync speaks `graphql-ws` with two differences: the handshake goes to a
//! separate realtime host with the API key encoded in the query string, and
//! every `start` frame carries the operation as a JSON *string* next to an
//! `authorization` extension.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use super::{DefaultCodec, Frame, MessageCodec, switch_to_socket_scheme};
use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, QueryPayload};

const API_HOST_MARKER: &str = ".appsync-api.";
const REALTIME_HOST_MARKER: &str = ".appsync-realtime-api.";

/// `base64("{}")`, the empty handshake payload.
const EMPTY_PAYLOAD: &str = "e30=";

const USER_AGENT: &str = concat!("horizon-lattice-graphql/", env!("CARGO_PKG_VERSION"));

/// Format a timestamp the way AppSync expects in `x-amz-date`:
/// ISO-8601 UTC with the `-` and `:` separators removed.
pub fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

#[derive(Serialize)]
struct HandshakeHeader<'a> {
    host: &'a str,
    #[serde(rename = "x-api-key")]
    api_key: &'a str,
}

#[derive(Serialize)]
struct Authorization<'a> {
    host: &'a str,
    #[serde(rename = "x-api-key")]
    api_key: &'a str,
    #[serde(rename = "x-amz-user-agent")]
    user_agent: &'a str,
    #[serde(rename = "x-amz-date")]
    date: String,
}

#[derive(Serialize)]
struct Extensions<'a> {
    authorization: Authorization<'a>,
}

#[derive(Serialize)]
struct SignedStart<'a> {
    data: String,
    extensions: Extensions<'a>,
}

/// Codec for AppSync API-key authenticated subscriptions.
#[derive(Debug, Clone)]
pub struct AppSyncCodec {
    host: String,
    api_key: String,
}

impl AppSyncCodec {
    /// Create a codec for the given GraphQL endpoint
    /// (`https://<id>.appsync-api.<region>.amazonaws.com/graphql`).
    pub fn new(endpoint: &Url, api_key: impl Into<String>) -> Result<Self> {
        let host = endpoint
            .host_str()
            .ok_or_else(|| ClientError::Request(format!("endpoint '{endpoint}' has no host")))?;
        Ok(Self {
            host: host.to_string(),
            api_key: api_key.into(),
        })
    }

    /// The API host that requests are signed for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Encode a `start` frame signed at `now`.
    pub fn encode_start_at(
        &self,
        id: &str,
        payload: &QueryPayload,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let data = serde_json::to_string(payload)
            .map_err(|e| ClientError::Request(format!("failed to encode operation: {e}")))?;
        let signed = SignedStart {
            data,
            extensions: Extensions {
                authorization: Authorization {
                    host: &self.host,
                    api_key: &self.api_key,
                    user_agent: USER_AGENT,
                    date: amz_date(now),
                },
            },
        };
        Frame::new("start", Some(id), Some(signed)).to_json()
    }

    /// Build the realtime handshake URL for an AppSync GraphQL endpoint.
    pub fn realtime_url(&self, endpoint: &Url) -> Result<Url> {
        let realtime_host = self.host.replacen(API_HOST_MARKER, REALTIME_HOST_MARKER, 1);

        let mut url = endpoint.clone();
        switch_to_socket_scheme(&mut url)?;
        url.set_host(Some(&realtime_host))?;

        let header = serde_json::to_vec(&HandshakeHeader {
            host: &self.host,
            api_key: &self.api_key,
        })
        .map_err(|e| ClientError::Request(format!("failed to encode handshake header: {e}")))?;
        url.set_query(Some(&format!(
            "header={}&payload={EMPTY_PAYLOAD}",
            BASE64.encode(header)
        )));

        tracing::debug!(
            target: "horizon_lattice_graphql::codec",
            host = %realtime_host,
            "using AppSync realtime endpoint"
        );
        Ok(url)
    }
}

impl MessageCodec for AppSyncCodec {
    fn encode(&self, message: &ClientMessage) -> Result<String> {
        match message {
            ClientMessage::Start { id, payload } => self.encode_start_at(id, payload, Utc::now()),
            other => DefaultCodec.encode(other),
        }
    }

    fn connection_url(&self, endpoint: &Url) -> Result<Url> {
        self.realtime_url(endpoint)
    }

    fn acknowledges_start(&self) -> bool {
        true
    }
}
