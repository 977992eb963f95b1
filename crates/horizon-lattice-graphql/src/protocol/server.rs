//! Server to client messages.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::RawFrame;
use crate::error::{ClientError, Result};
use crate::response::ErrorData;

/// The payload of a `data` or `error` frame.
///
/// Nothing inside the payload is decoded until a target type is requested,
/// so unused or malformed fields never fail the frame itself.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePayload(Value);

impl MessagePayload {
    /// Wrap a raw JSON payload.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Decode the payload's `data` field as `T`.
    ///
    /// A payload that carries a non-empty `errors` list fails with
    /// [`ClientError::Response`] instead.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        let errors = self.embedded_errors();
        if !errors.is_empty() {
            return Err(ClientError::Response(errors));
        }

        let data = self
            .0
            .get("data")
            .ok_or_else(|| ClientError::Decode("payload has no 'data' field".into()))?;
        serde_json::from_value(data.clone())
            .map_err(|e| ClientError::Decode(format!("failed to decode payload data: {e}")))
    }

    /// Interpret the payload as a list of GraphQL errors.
    ///
    /// Servers disagree on the shape: a bare error object, an array, an
    /// object with an `errors` array, or an error nested under `data`. Any
    /// of these is accepted; anything else becomes a single error whose
    /// message is the raw payload.
    pub fn errors(&self) -> Vec<ErrorData> {
        let errors = self.embedded_errors();
        if !errors.is_empty() {
            return errors;
        }

        if let Ok(list) = serde_json::from_value::<Vec<ErrorData>>(self.0.clone()) {
            return list;
        }
        if let Ok(single) = serde_json::from_value::<ErrorData>(self.0.clone()) {
            return vec![single];
        }
        if let Some(nested) = self.0.get("data")
            && let Ok(single) = serde_json::from_value::<ErrorData>(nested.clone())
        {
            return vec![single];
        }

        vec![ErrorData::new(self.0.to_string())]
    }

    fn embedded_errors(&self) -> Vec<ErrorData> {
        self.0
            .get("errors")
            .and_then(|errors| serde_json::from_value(errors.clone()).ok())
            .unwrap_or_default()
    }

    /// The raw payload.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the payload, returning the raw JSON.
    pub fn into_value(self) -> Value {
        self.0
    }
}

/// A message sent from the server to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The server accepted `connection_init`.
    ConnectionAck,
    /// The server rejected the connection.
    ConnectionError {
        /// Error details, if any were sent.
        payload: Option<MessagePayload>,
    },
    /// The server registered the subscription `id`.
    StartAck {
        /// Subscription id.
        id: String,
    },
    /// A result for subscription `id`.
    Data {
        /// Subscription id.
        id: String,
        /// The result envelope.
        payload: MessagePayload,
    },
    /// An error for subscription `id`. Terminal for that subscription.
    Error {
        /// Subscription id.
        id: String,
        /// The error payload.
        payload: MessagePayload,
    },
    /// The server finished subscription `id`.
    Complete {
        /// Subscription id.
        id: String,
    },
    /// Keep-alive (`ka`).
    KeepAlive,
}

impl ServerMessage {
    /// Parse a server frame, looking at `type` before anything else.
    ///
    /// An unrecognized `type` is a [`ClientError::Decode`].
    pub fn from_json(text: &str) -> Result<Self> {
        let mut frame = RawFrame::parse(text)?;
        let message = match frame.kind.as_str() {
            "connection_ack" => Self::ConnectionAck,
            "ka" => Self::KeepAlive,
            "connection_error" => Self::ConnectionError {
                payload: frame.payload.take().map(MessagePayload),
            },
            "start_ack" => Self::StartAck {
                id: frame.require_id()?,
            },
            "complete" => Self::Complete {
                id: frame.require_id()?,
            },
            "data" => Self::Data {
                id: frame.require_id()?,
                payload: MessagePayload(frame.require_payload()?),
            },
            "error" => Self::Error {
                id: frame.require_id()?,
                payload: MessagePayload(frame.require_payload()?),
            },
            other => {
                return Err(ClientError::Decode(format!(
                    "unknown server message type '{other}'"
                )));
            }
        };
        Ok(message)
    }

    /// Encode the frame as a server sends it. Test servers use this to
    /// answer a client.
    pub fn to_json(&self) -> String {
        let payload = match self {
            Self::ConnectionError { payload } => payload.as_ref(),
            Self::Data { payload, .. } | Self::Error { payload, .. } => Some(payload),
            _ => None,
        };

        let mut frame = Map::new();
        frame.insert("type".into(), Value::from(self.kind()));
        if let Some(id) = self.id() {
            frame.insert("id".into(), Value::from(id));
        }
        if let Some(payload) = payload {
            frame.insert("payload".into(), payload.as_value().clone());
        }
        Value::Object(frame).to_string()
    }

    /// The wire discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionAck => "connection_ack",
            Self::ConnectionError { .. } => "connection_error",
            Self::StartAck { .. } => "start_ack",
            Self::Data { .. } => "data",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
            Self::KeepAlive => "ka",
        }
    }

    /// The subscription id the message refers to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::StartAck { id }
            | Self::Data { id, .. }
            | Self::Error { id, .. }
            | Self::Complete { id } => Some(id),
            Self::ConnectionAck | Self::ConnectionError { .. } | Self::KeepAlive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_control_frames() {
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"connection_ack"}"#).unwrap(),
            ServerMessage::ConnectionAck
        );
        // AppSync attaches a payload to the ack
        assert_eq!(
            ServerMessage::from_json(
                r#"{"type":"connection_ack","payload":{"connectionTimeoutMs":300000}}"#
            )
            .unwrap(),
            ServerMessage::ConnectionAck
        );
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"ka"}"#).unwrap(),
            ServerMessage::KeepAlive
        );
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"complete","id":"9"}"#).unwrap(),
            ServerMessage::Complete { id: "9".into() }
        );
        assert_eq!(
            ServerMessage::from_json(r#"{"type":"start_ack","id":"9"}"#).unwrap(),
            ServerMessage::StartAck { id: "9".into() }
        );
    }

    #[test]
    fn test_data_payload_is_lazy() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Todo {
            id: String,
        }

        // "extra" would not fit Todo, but it is never looked at
        let message = ServerMessage::from_json(
            r#"{"type":"data","id":"123","payload":{"data":{"id":"t1"},"extra":[1,2]}}"#,
        )
        .unwrap();

        let ServerMessage::Data { id, payload } = message else {
            panic!("expected data");
        };
        assert_eq!(id, "123");
        assert_eq!(payload.data::<Todo>().unwrap(), Todo { id: "t1".into() });
        assert!(matches!(
            payload.data::<Vec<String>>(),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn test_data_with_errors_is_response_error() {
        let payload = MessagePayload::new(json!({
            "data": null,
            "errors": [{"message": "not allowed"}]
        }));
        let err = payload.data::<Value>().unwrap_err();
        assert_eq!(err.response_errors().unwrap()[0].message, "not allowed");
    }

    #[test]
    fn test_error_payload_shapes() {
        let single = MessagePayload::new(json!({"message": "bad query"}));
        assert_eq!(single.errors()[0].message, "bad query");

        let list = MessagePayload::new(json!([{"message": "a"}, {"message": "b"}]));
        assert_eq!(list.errors().len(), 2);

        let wrapped = MessagePayload::new(json!({"errors": [{"message": "c"}]}));
        assert_eq!(wrapped.errors()[0].message, "c");

        let nested = MessagePayload::new(json!({"data": {"message": "d"}}));
        assert_eq!(nested.errors()[0].message, "d");

        let opaque = MessagePayload::new(json!("boom"));
        assert_eq!(opaque.errors()[0].message, "\"boom\"");
    }

    #[test]
    fn test_every_variant_survives_encoding() {
        let messages = [
            ServerMessage::ConnectionAck,
            ServerMessage::ConnectionError { payload: None },
            ServerMessage::ConnectionError {
                payload: Some(MessagePayload::new(json!({"message": "bad token"}))),
            },
            ServerMessage::StartAck { id: "1".into() },
            ServerMessage::Data {
                id: "1".into(),
                payload: MessagePayload::new(json!({"data": {"n": 1}})),
            },
            ServerMessage::Error {
                id: "1".into(),
                payload: MessagePayload::new(json!([{"message": "denied"}])),
            },
            ServerMessage::Complete { id: "1".into() },
            ServerMessage::KeepAlive,
        ];

        for message in messages {
            let text = message.to_json();
            assert_eq!(ServerMessage::from_json(&text).unwrap(), message, "{text}");
        }
    }

    #[test]
    fn test_encoding_matches_wire_format() {
        assert_eq!(ServerMessage::KeepAlive.to_json(), r#"{"type":"ka"}"#);

        let frame: Value = serde_json::from_str(
            &ServerMessage::Data {
                id: "7".into(),
                payload: MessagePayload::new(json!({"data": null})),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(frame, json!({"type": "data", "id": "7", "payload": {"data": null}}));
    }

    #[test]
    fn test_unknown_type_is_decode_error() {
        assert!(matches!(
            ServerMessage::from_json(r#"{"type":"next","id":"1","payload":{}}"#),
            Err(ClientError::Decode(_))
        ));
        assert!(matches!(
            ServerMessage::from_json("not json"),
            Err(ClientError::Decode(_))
        ));
        assert!(ServerMessage::from_json(r#"{"type":"data","payload":{}}"#).is_err());
    }
}
