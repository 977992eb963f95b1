//! Routing of inbound subscription frames.

use crate::error::ClientError;
use crate::protocol::{ClientMessage, ServerMessage};

use super::registry::{SubscriptionRegistry, SubscriptionState};

/// Route a subscription-level message to its subscriber.
///
/// Returns a `stop` frame when the message completes a deferred
/// cancellation or ends a subscription with an error. Frames for unknown ids
/// are dropped. Connection-level messages (`connection_ack`,
/// `connection_error`) are handled by the connection before this point.
pub(crate) fn dispatch(
    registry: &mut SubscriptionRegistry,
    message: ServerMessage,
) -> Option<ClientMessage> {
    match message {
        ServerMessage::StartAck { id } => registry.acknowledge(&id),

        ServerMessage::Data { id, payload } => {
            // data proves the server registered the subscription
            if let Some(stop) = implicit_ack(registry, &id) {
                return Some(stop);
            }
            match registry.handler(&id) {
                Some(handler) => handler.on_message(payload),
                None => drop_unknown(&id, "data"),
            }
            None
        }

        ServerMessage::Error { id, payload } => {
            if let Some(stop) = implicit_ack(registry, &id) {
                return Some(stop);
            }
            match registry.handler(&id) {
                Some(handler) => {
                    handler.on_error(ClientError::Response(payload.errors()));
                    registry.unregister(&id)
                }
                None => {
                    drop_unknown(&id, "error");
                    None
                }
            }
        }

        ServerMessage::Complete { id } => {
            // the server already forgot the id, so no stop is owed
            match registry.remove(&id) {
                Some(handler) => handler.on_complete(),
                None => tracing::trace!(
                    target: "horizon_lattice_graphql::subscription",
                    id = %id,
                    "complete for inactive subscription"
                ),
            }
            None
        }

        ServerMessage::KeepAlive => {
            tracing::trace!(target: "horizon_lattice_graphql::subscription", "keep-alive");
            None
        }

        ServerMessage::ConnectionAck | ServerMessage::ConnectionError { .. } => {
            tracing::debug!(
                target: "horizon_lattice_graphql::subscription",
                kind = message.kind(),
                "connection-level message ignored by dispatcher"
            );
            None
        }
    }
}

/// Acknowledge `id` if it is still waiting. Returns the deferred `stop` of a
/// cancelled subscription.
fn implicit_ack(registry: &mut SubscriptionRegistry, id: &str) -> Option<ClientMessage> {
    match registry.state(id) {
        Some(SubscriptionState::Initialized) | Some(SubscriptionState::Cancelled) => {
            registry.acknowledge(id)
        }
        _ => None,
    }
}

fn drop_unknown(id: &str, kind: &str) {
    tracing::trace!(
        target: "horizon_lattice_graphql::subscription",
        id = %id,
        kind,
        "frame for unknown subscription dropped"
    );
}
