//! Per-subscription lifecycle tracking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, MessagePayload};

/// Receives events for one subscription.
///
/// Handlers are invoked while the connection lock is held and must not
/// block or call back into the connection.
pub(crate) trait SubscriptionHandler: Send + Sync {
    /// A `data` frame arrived.
    fn on_message(&self, payload: MessagePayload);
    /// The subscription failed. No further events follow.
    fn on_error(&self, error: ClientError);
    /// The server completed the subscription. No further events follow.
    fn on_complete(&self);
}

/// Lifecycle of a registered subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// `start` queued or sent, not yet acknowledged by the server.
    Initialized,
    /// The server has registered the subscription.
    Acknowledged,
    /// Cancelled locally before acknowledgement. The `stop` frame is held
    /// back until the acknowledgement arrives.
    Cancelled,
}

struct Entry {
    state: SubscriptionState,
    /// `None` once cancelled; nothing is delivered after that.
    handler: Option<Arc<dyn SubscriptionHandler>>,
}

/// Subscriptions multiplexed over one connection, keyed by id.
///
/// Methods that may require a `stop` frame return it instead of sending it,
/// leaving queueing to the connection.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: HashMap<String, Entry>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a subscription in the `Initialized` state.
    pub(crate) fn register(
        &mut self,
        id: impl Into<String>,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<()> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(ClientError::Request(format!(
                "subscription id '{id}' is already registered"
            )));
        }
        tracing::debug!(target: "horizon_lattice_graphql::subscription", id = %id, "registered");
        self.entries.insert(
            id,
            Entry {
                state: SubscriptionState::Initialized,
                handler: Some(handler),
            },
        );
        Ok(())
    }

    /// The server has registered `id`.
    ///
    /// Moves `Initialized` to `Acknowledged`. For a subscription cancelled
    /// while waiting, the entry is removed and the deferred `stop` returned.
    pub(crate) fn acknowledge(&mut self, id: &str) -> Option<ClientMessage> {
        let entry = self.entries.get_mut(id)?;
        match entry.state {
            SubscriptionState::Initialized => {
                entry.state = SubscriptionState::Acknowledged;
                tracing::debug!(target: "horizon_lattice_graphql::subscription", id = %id, "acknowledged");
                None
            }
            SubscriptionState::Acknowledged => None,
            SubscriptionState::Cancelled => {
                self.entries.remove(id);
                tracing::debug!(
                    target: "horizon_lattice_graphql::subscription",
                    id = %id,
                    "acknowledged after cancel, stopping"
                );
                Some(ClientMessage::stop(id))
            }
        }
    }

    /// Stop delivering to `id`.
    ///
    /// An acknowledged subscription is removed and its `stop` returned. One
    /// the server has not acknowledged yet is only marked `Cancelled`; the
    /// `stop` comes out of [`acknowledge`](Self::acknowledge) later.
    pub(crate) fn unregister(&mut self, id: &str) -> Option<ClientMessage> {
        let entry = self.entries.get_mut(id)?;
        match entry.state {
            SubscriptionState::Initialized => {
                entry.state = SubscriptionState::Cancelled;
                entry.handler = None;
                tracing::debug!(
                    target: "horizon_lattice_graphql::subscription",
                    id = %id,
                    "cancelled before acknowledgement, deferring stop"
                );
                None
            }
            SubscriptionState::Acknowledged => {
                self.entries.remove(id);
                tracing::debug!(target: "horizon_lattice_graphql::subscription", id = %id, "unregistered");
                Some(ClientMessage::stop(id))
            }
            SubscriptionState::Cancelled => None,
        }
    }

    /// Drop `id` without any `stop` frame, returning its handler if it was
    /// still live.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<dyn SubscriptionHandler>> {
        self.entries.remove(id).and_then(|entry| entry.handler)
    }

    /// The handler for `id`, unless unknown or cancelled.
    pub(crate) fn handler(&self, id: &str) -> Option<Arc<dyn SubscriptionHandler>> {
        self.entries.get(id).and_then(|entry| entry.handler.clone())
    }

    pub(crate) fn state(&self, id: &str) -> Option<SubscriptionState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fail every live subscription with `error` and forget all entries.
    pub(crate) fn fail_all(&mut self, error: &ClientError) -> usize {
        let mut failed = 0;
        for (_, entry) in self.entries.drain() {
            if let Some(handler) = entry.handler {
                handler.on_error(error.clone());
                failed += 1;
            }
        }
        failed
    }

    /// Forget all entries without notifying anyone.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
