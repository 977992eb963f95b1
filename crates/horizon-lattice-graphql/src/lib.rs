//! GraphQL client for Horizon Lattice.
//!
//! This crate talks to GraphQL servers over two transports:
//!
//! - **Queries and mutations**: plain HTTP POST requests
//! - **Subscriptions**: one multiplexed websocket speaking the `graphql-ws`
//!   protocol
//!
//! # Queries
//!
//! ```ignore
//! use horizon_lattice_graphql::GraphQLClient;
//!
//! let client = GraphQLClient::builder("https://api.example.com/graphql").build()?;
//!
//! let user: User = client
//!     .query("query($id: ID!) { user(id: $id) { name } }", json!({"id": "1"}))
//!     .await?;
//! ```
//!
//! A response that carries an `errors` list fails with
//! [`ClientError::Response`], whether or not it also carries data.
//!
//! # Subscriptions
//!
//! ```ignore
//! use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
//!
//! let request = GraphQLRequest::subscription("subscription { messages { text } }");
//! let mut stream = client.subscribe::<Messages>(request).await?;
//!
//! while let Some(item) = stream.next().await {
//!     let messages = item?;
//! }
//! ```
//!
//! The socket is opened on the first subscription and shared by all of
//! them. Frames queue until the server acknowledges the connection and then
//! go out one at a time in the order they were queued. A subscription
//! cancelled before the server acknowledged it sends its `stop` once the
//! acknowledgement arrives, so the server never keeps an orphaned
//! subscription.
//!
//! If the socket fails, every open stream yields the error and ends; the
//! next `subscribe` opens a fresh socket.
//!
//! # AWS AppSync
//!
//! ```ignore
//! use horizon_lattice_graphql::{AppSyncPlugin, GraphQLClient};
//!
//! let client = GraphQLClient::builder("https://xyz.appsync-api.us-east-1.amazonaws.com/graphql")
//!     .plugin(AppSyncPlugin::new("da2-..."))
//!     .build()?;
//! ```
//!
//! The plugin adds the API key to HTTP requests and switches subscriptions to
//! AppSync's realtime endpoint and signed `start` frames.

pub mod codec;
pub mod connection;
pub mod protocol;
pub mod subscription;

mod client;
mod error;
mod plugin;
mod request;
mod response;

pub use client::{GraphQLClient, GraphQLClientBuilder};
pub use codec::{AppSyncCodec, DefaultCodec, MessageCodec};
pub use connection::{ConnectionConfig, ConnectionState};
pub use error::{ClientError, Result};
pub use plugin::{AppSyncPlugin, Plugin};
pub use protocol::{ClientMessage, MessagePayload, ServerMessage};
pub use request::{GraphQLRequest, OperationType};
pub use response::{ErrorData, GraphQLLocation, GraphQLResponse, PathSegment};
pub use subscription::{SubscriptionState, SubscriptionStream};
