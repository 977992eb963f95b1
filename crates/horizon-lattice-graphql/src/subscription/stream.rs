//! Consumer side of a subscription.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connection::ConnectionShared;
use crate::error::{ClientError, Result};
use crate::protocol::MessagePayload;

use super::registry::SubscriptionHandler;

/// What a subscription handler forwards to its stream.
#[derive(Debug)]
pub(crate) enum SubscriptionEvent {
    Message(MessagePayload),
    Error(ClientError),
    Complete,
}

/// Handler that forwards every event into a channel.
pub(crate) struct ChannelHandler {
    sender: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl ChannelHandler {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<SubscriptionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SubscriptionHandler for ChannelHandler {
    fn on_message(&self, payload: MessagePayload) {
        // receiver gone means the stream is being dropped
        let _ = self.sender.send(SubscriptionEvent::Message(payload));
    }

    fn on_error(&self, error: ClientError) {
        let _ = self.sender.send(SubscriptionEvent::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.sender.send(SubscriptionEvent::Complete);
    }
}

/// A live subscription.
///
/// Yields one item per `data` frame, each decoded into `T` from the
/// payload's `data` field. A failed decode yields `Err` without ending the
/// stream; a subscription error or a connection failure yields one `Err`
/// and then the stream ends. A server `complete` ends it without an error.
///
/// Dropping the stream cancels the subscription.
///
/// # Example
///
/// ```ignore
/// let mut stream = client
///     .subscribe::<Value>(GraphQLRequest::subscription("subscription { ticks }"))
///     .await?;
///
/// while let Some(item) = stream.next().await {
///     println!("{:?}", item?);
/// }
/// ```
pub struct SubscriptionStream<T = Value> {
    id: String,
    receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
    connection: Weak<ConnectionShared>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SubscriptionStream<T> {
    pub(crate) fn new(
        id: String,
        receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
        connection: Weak<ConnectionShared>,
    ) -> Self {
        Self {
            id,
            receiver,
            connection,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// The subscription id used on the wire.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the stream has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Cancel the subscription.
    ///
    /// Nothing is delivered afterwards. If the server has not yet
    /// acknowledged the subscription, the `stop` frame goes out once it does.
    pub fn cancel(&mut self) {
        self.finished = true;
        if let Some(connection) = self.connection.upgrade() {
            connection.unsubscribe(&self.id);
        }
        self.connection = Weak::new();
        self.receiver.close();
    }
}

impl<T: DeserializeOwned> SubscriptionStream<T> {
    /// Wait for the next item. Returns `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<T>> {
        std::future::poll_fn(|cx| self.poll_item(cx)).await
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T>>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let event = match self.receiver.poll_recv(cx) {
            Poll::Ready(event) => event,
            Poll::Pending => return Poll::Pending,
        };
        Poll::Ready(match event {
            Some(SubscriptionEvent::Message(payload)) => Some(payload.data::<T>()),
            Some(SubscriptionEvent::Error(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            Some(SubscriptionEvent::Complete) | None => {
                self.finished = true;
                None
            }
        })
    }
}

impl<T: DeserializeOwned> Stream for SubscriptionStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl<T> Drop for SubscriptionStream<T> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.upgrade() {
            connection.unsubscribe(&self.id);
        }
    }
}

impl<T> std::fmt::Debug for SubscriptionStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detached(receiver: mpsc::UnboundedReceiver<SubscriptionEvent>) -> SubscriptionStream<Value> {
        SubscriptionStream::new("s1".into(), receiver, Weak::new())
    }

    #[tokio::test]
    async fn test_messages_then_complete() {
        let (handler, receiver) = ChannelHandler::new();
        let mut stream = detached(receiver);

        handler.on_message(MessagePayload::new(json!({"data": {"n": 1}})));
        handler.on_complete();

        assert_eq!(stream.next().await.unwrap().unwrap(), json!({"n": 1}));
        assert!(stream.next().await.is_none());
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let (handler, receiver) = ChannelHandler::new();
        let mut stream = detached(receiver);

        handler.on_error(ClientError::ConnectionClosed);
        handler.on_message(MessagePayload::new(json!({"data": {}})));

        assert!(matches!(
            stream.next().await,
            Some(Err(ClientError::ConnectionClosed))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_stream_open() {
        let (handler, receiver) = ChannelHandler::new();
        let mut stream: SubscriptionStream<u32> =
            SubscriptionStream::new("s1".into(), receiver, Weak::new());

        handler.on_message(MessagePayload::new(json!({"data": "not a number"})));
        handler.on_message(MessagePayload::new(json!({"data": 7})));

        assert!(matches!(stream.next().await, Some(Err(ClientError::Decode(_)))));
        assert_eq!(stream.next().await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_handler_dropped_ends_stream() {
        let (handler, receiver) = ChannelHandler::new();
        let mut stream = detached(receiver);
        drop(handler);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let (handler, receiver) = ChannelHandler::new();
        let mut stream = detached(receiver);

        stream.cancel();
        handler.on_message(MessagePayload::new(json!({"data": {}})));
        assert!(stream.next().await.is_none());
    }
}
