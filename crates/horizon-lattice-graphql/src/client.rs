//! GraphQL client implementation.

use std::sync::Arc;
use std::time::Duration;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use crate::codec::{DefaultCodec, MessageCodec};
use crate::connection::{Connection, ConnectionConfig, ConnectionShared, ConnectionState};
use crate::error::{ClientError, Result};
use crate::plugin::Plugin;
use crate::request::GraphQLRequest;
use crate::response::GraphQLResponse;
use crate::subscription::{ChannelHandler, SubscriptionStream};

/// Builder for creating a GraphQL client.
pub struct GraphQLClientBuilder {
    endpoint: String,
    websocket_url: Option<String>,
    default_headers: Vec<(String, String)>,
    plugin: Option<Arc<dyn Plugin>>,
    request_timeout: Option<Duration>,
    connection_timeout: Duration,
    connection_ack_timeout: Option<Duration>,
    start_ack_timeout: Option<Duration>,
    websocket_extensions: Option<String>,
}

impl GraphQLClientBuilder {
    /// Create a new builder with the specified GraphQL endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            websocket_url: None,
            default_headers: Vec::new(),
            plugin: None,
            request_timeout: None,
            connection_timeout: Duration::from_secs(30),
            connection_ack_timeout: Some(Duration::from_secs(30)),
            start_ack_timeout: Some(Duration::from_secs(30)),
            websocket_extensions: Some(crate::connection::DEFAULT_WEBSOCKET_EXTENSIONS.into()),
        }
    }

    /// Set a separate WebSocket URL for subscriptions.
    ///
    /// If not set, the codec derives it from the endpoint
    /// (http:// -> ws://, https:// -> wss://).
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Add a default header to all requests, including the websocket upgrade.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set bearer token authentication.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Install a backend plugin.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugin = Some(Arc::new(plugin));
        self
    }

    /// Set the request timeout for HTTP operations.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the connect and handshake timeout for the subscription socket.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// How long to wait for `connection_ack`.
    ///
    /// Set to `None` to wait indefinitely.
    pub fn connection_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_ack_timeout = timeout;
        self
    }

    /// How long a subscription waits for `start_ack` once its `start` frame
    /// is written. Only applies to backends that send `start_ack`, such as
    /// AppSync.
    ///
    /// Set to `None` to wait indefinitely.
    pub fn start_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.start_ack_timeout = timeout;
        self
    }

    /// The `Sec-WebSocket-Extensions` value offered during the upgrade.
    ///
    /// Set to `None` to omit the header.
    pub fn websocket_extensions(mut self, extensions: Option<String>) -> Self {
        self.websocket_extensions = extensions;
        self
    }

    /// Build the GraphQL client.
    pub fn build(self) -> Result<GraphQLClient> {
        let endpoint = Url::parse(&self.endpoint)?;
        let websocket_url = self.websocket_url.as_deref().map(Url::parse).transpose()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.default_headers {
            headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let mut connection = ConnectionConfig::new(endpoint.clone());
        connection.websocket_url = websocket_url;
        connection.headers = headers.clone();
        connection.extensions = self.websocket_extensions;
        connection.connection_timeout = self.connection_timeout;
        connection.ack_timeout = self.connection_ack_timeout;
        connection.start_ack_timeout = self.start_ack_timeout;

        Ok(GraphQLClient {
            inner: Arc::new(GraphQLClientInner {
                http,
                endpoint,
                headers,
                plugin: self.plugin,
                connection_config: connection,
                connection: Mutex::new(None),
            }),
        })
    }
}

struct GraphQLClientInner {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    plugin: Option<Arc<dyn Plugin>>,
    connection_config: ConnectionConfig,
    connection: Mutex<Option<Connection>>,
}

/// A GraphQL client for queries, mutations, and subscriptions.
///
/// Queries and mutations are plain HTTP POSTs. Subscriptions share one
/// websocket, opened on the first [`subscribe`](Self::subscribe) and
/// replaced by a fresh one if it terminates. Clones share the socket; it is
/// closed when the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
///
/// let client = GraphQLClient::builder("https://api.example.com/graphql")
///     .bearer_auth("my-token")
///     .build()?;
///
/// // Execute a query
/// let users: Value = client.query("{ users { id name } }", json!({})).await?;
///
/// // Subscribe to events
/// let request = GraphQLRequest::subscription("subscription { events { id } }");
/// let mut stream = client.subscribe::<Value>(request).await?;
/// while let Some(event) = stream.next().await {
///     println!("{:?}", event?);
/// }
/// ```
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<GraphQLClientInner>,
}

impl GraphQLClient {
    /// Create a new builder for configuring a GraphQL client.
    pub fn builder(endpoint: impl Into<String>) -> GraphQLClientBuilder {
        GraphQLClientBuilder::new(endpoint)
    }

    /// Get the HTTP endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Execute a GraphQL operation (query or mutation) and return the raw
    /// response envelope.
    ///
    /// For subscriptions, use `subscribe()` instead.
    pub async fn execute(&self, request: &GraphQLRequest) -> Result<GraphQLResponse> {
        if request.is_subscription() {
            return Err(ClientError::Request(
                "use subscribe() for subscription operations".into(),
            ));
        }

        let mut headers = self.inner.headers.clone();
        if let Some(plugin) = &self.inner.plugin {
            plugin.decorate(&mut headers, false)?;
        }
        let body = serde_json::to_vec(request)
            .map_err(|e| ClientError::Request(format!("failed to encode request: {e}")))?;

        tracing::debug!(
            target: "horizon_lattice_graphql::client",
            operation = ?request.operation_type(),
            "executing"
        );
        let response = self
            .inner
            .http
            .post(self.inner.endpoint.clone())
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            // servers often report GraphQL errors with a 4xx status
            if let Some(errors) = body
                .as_deref()
                .and_then(|text| serde_json::from_str::<GraphQLResponse>(text).ok())
                .filter(GraphQLResponse::has_errors)
                .map(|response| response.errors)
            {
                return Err(ClientError::Response(errors));
            }
            tracing::warn!(
                target: "horizon_lattice_graphql::client",
                status = status.as_u16(),
                "request failed"
            );
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.json::<GraphQLResponse>().await?)
    }

    /// Run a query and decode its `data` into `T`.
    ///
    /// A response carrying errors fails with [`ClientError::Response`], even
    /// if it also carries data.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        let request = GraphQLRequest::query(query).variables(variables)?;
        self.execute(&request).await?.into_data()
    }

    /// Run a mutation and decode its `data` into `T`.
    pub async fn mutation<T: DeserializeOwned>(
        &self,
        mutation: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        let request = GraphQLRequest::mutation(mutation).variables(variables)?;
        self.execute(&request).await?.into_data()
    }

    /// Start a subscription.
    ///
    /// Opens the subscription socket if needed. The `start` frame is queued
    /// and sent once the server has acknowledged the connection.
    pub async fn subscribe<T: DeserializeOwned>(
        &self,
        request: GraphQLRequest,
    ) -> Result<SubscriptionStream<T>> {
        if !request.is_subscription() {
            return Err(ClientError::Request(
                "expected a subscription operation".into(),
            ));
        }

        let connection = self.connection().await?;
        let id = Uuid::new_v4().to_string();
        let (handler, receiver) = ChannelHandler::new();
        connection.subscribe(&id, request, Arc::new(handler))?;

        tracing::debug!(target: "horizon_lattice_graphql::client", id = %id, "subscribed");
        Ok(SubscriptionStream::new(
            id,
            receiver,
            Arc::downgrade(&connection),
        ))
    }

    /// State of the subscription socket, if one has been opened.
    pub async fn connection_state(&self) -> Option<ConnectionState> {
        self.inner.connection.lock().await.as_ref().map(Connection::state)
    }

    /// The live connection, opening a new one if there is none or the last
    /// one terminated.
    async fn connection(&self) -> Result<Arc<ConnectionShared>> {
        let mut guard = self.inner.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            if !connection.state().is_terminated() {
                return Ok(connection.shared().clone());
            }
            tracing::debug!(
                target: "horizon_lattice_graphql::client",
                "replacing terminated connection"
            );
        }

        let codec: Arc<dyn MessageCodec> = match &self.inner.plugin {
            Some(plugin) => plugin.codec(&self.inner.endpoint)?,
            None => Arc::new(DefaultCodec),
        };
        let mut config = self.inner.connection_config.clone();
        if let Some(plugin) = &self.inner.plugin {
            plugin.decorate(&mut config.headers, true)?;
        }

        let connection = Connection::open(&config, codec).await?;
        let shared = connection.shared().clone();
        *guard = Some(connection);
        Ok(shared)
    }
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("plugin", &self.inner.plugin)
            .finish()
    }
}
