//! GraphQL response types.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;

use crate::error::{ClientError, Result};

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// The error message.
    pub message: String,

    /// Longer human-readable description, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl ErrorData {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            description: None,
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{name}")?,
                    PathSegment::Index(idx) => write!(f, "[{idx}]")?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// A GraphQL response envelope from the HTTP path.
///
/// `data` is kept as raw JSON and only decoded when a target type is
/// supplied, so fields the caller never asks for cannot fail the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors that occurred during execution. `null` and absent are treated
    /// the same as an empty list.
    #[serde(default, deserialize_with = "nullable_errors")]
    pub errors: Vec<ErrorData>,
}

fn nullable_errors<'de, D>(deserializer: D) -> std::result::Result<Vec<ErrorData>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ErrorData>>::deserialize(deserializer)?.unwrap_or_default())
}

impl GraphQLResponse {
    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Decode `data` as `T`.
    ///
    /// A non-empty error list fails with [`ClientError::Response`] without
    /// looking at `data` at all.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        if self.has_errors() {
            return Err(ClientError::Response(self.errors.clone()));
        }

        match &self.data {
            Some(data) => serde_json::from_value(data.clone()).map_err(|e| {
                ClientError::Decode(format!("Failed to deserialize GraphQL response: {e}"))
            }),
            None => Err(ClientError::Decode("No data in GraphQL response".into())),
        }
    }

    /// Consume the response, returning `data` as `T`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        if self.has_errors() {
            return Err(ClientError::Response(self.errors));
        }

        match self.data {
            Some(data) => serde_json::from_value(data).map_err(|e| {
                ClientError::Decode(format!("Failed to deserialize GraphQL response: {e}"))
            }),
            None => Err(ClientError::Decode("No data in GraphQL response".into())),
        }
    }
}
