//! GraphQL request types.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationType {
    /// A query operation (read-only).
    #[default]
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (real-time updates).
    Subscription,
}

impl OperationType {
    /// The key the document is sent under in an HTTP body.
    fn body_key(self) -> &'static str {
        match self {
            Self::Mutation => "mutation",
            Self::Query | Self::Subscription => "query",
        }
    }
}

/// A GraphQL operation with its variables.
///
/// Over HTTP it serializes as `{"query": ..., "variables": ...}`, or with a
/// `mutation` key for mutations. Over the socket it becomes the payload of a
/// `start` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLRequest {
    /// The GraphQL document.
    pub query: String,
    /// Variables, always a JSON value (an empty object when none are set).
    pub variables: Value,
    operation_type: OperationType,
}

impl GraphQLRequest {
    fn with_type(query: impl Into<String>, operation_type: OperationType) -> Self {
        Self {
            query: query.into(),
            variables: Value::Object(Map::new()),
            operation_type,
        }
    }

    /// Create a new query request.
    pub fn query(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Query)
    }

    /// Create a new mutation request.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = GraphQLRequest::mutation(r#"
    ///     mutation CreateTodo($name: String!) {
    ///         createTodo(name: $name) { id }
    ///     }
    /// "#)
    /// .variable("name", "write docs")?;
    /// ```
    pub fn mutation(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Mutation)
    }

    /// Create a new subscription request.
    pub fn subscription(query: impl Into<String>) -> Self {
        Self::with_type(query, OperationType::Subscription)
    }

    /// Replace all variables with a serializable value.
    ///
    /// Fails immediately with [`ClientError::Request`] if `variables` cannot
    /// be represented as JSON.
    pub fn variables(mut self, variables: impl Serialize) -> Result<Self> {
        self.variables = serde_json::to_value(variables)
            .map_err(|e| ClientError::Request(format!("failed to encode variables: {e}")))?;
        Ok(self)
    }

    /// Set a single variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| ClientError::Request(format!("failed to encode variable: {e}")))?;
        match &mut self.variables {
            Value::Object(map) => {
                map.insert(name.into(), value);
            }
            other => {
                let mut map = Map::new();
                map.insert(name.into(), value);
                *other = Value::Object(map);
            }
        }
        Ok(self)
    }

    /// Get the operation type.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Check if this is a subscription.
    pub fn is_subscription(&self) -> bool {
        self.operation_type == OperationType::Subscription
    }
}

impl Serialize for GraphQLRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.operation_type.body_key(), &self.query)?;
        map.serialize_entry("variables", &self.variables)?;
        map.end()
    }
}
