//! The subscription socket.
//!
//! A `Connection` owns one websocket and multiplexes every subscription
//! over it. Two tasks drive the socket: the reader decodes inbound frames
//! and hands them to `ConnectionShared::process_message`, and the writer
//! sends whatever the connection releases to it. Connection state, the
//! outbound queue and the subscription registry sit behind one lock, so a
//! state change and the queue drain it triggers happen together.
//!
//! # Lifecycle
//!
//! 1. The socket opens and `connection_init` is written at once, bypassing
//!    the queue. The connection is `Initializing`.
//! 2. Everything else queues until `connection_ack` makes it `Active`. The
//!    queue then releases one frame at a time, each after the previous
//!    write finished.
//! 3. A transport failure, `connection_error` or a missing `connection_ack`
//!    makes it `Terminated`: every live subscription receives the error and
//!    further sends fail with [`ClientError::ConnectionClosed`]. A `start`
//!    that the codec expects a `start_ack` for, and that gets none in time,
//!    only fails its own subscription.
//! 4. Dropping the `Connection` writes `connection_terminate` and closes
//!    the socket.

mod config;
mod queue;
mod state;

pub use config::{ConnectionConfig, DEFAULT_WEBSOCKET_EXTENSIONS};
pub use state::ConnectionState;

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::HeaderValue;
use http::header::{SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::codec::MessageCodec;
use crate::error::{ClientError, Result};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::request::GraphQLRequest;
use crate::response::ErrorData;
use crate::subscription::{SubscriptionHandler, SubscriptionRegistry, SubscriptionState, dispatch};

use queue::{OutboundFrame, OutboundQueue};

/// Instructions for the writer task.
#[derive(Debug)]
enum WriterCommand {
    /// Write immediately, outside the queue.
    Direct(String),
    /// The queue's in-flight frame. Completion is reported back.
    Queued(OutboundFrame),
    /// Write an optional final frame, then close the socket.
    Close(Option<String>),
}

/// Mutable connection state, guarded by `ConnectionShared::core`.
struct Core {
    state: ConnectionState,
    queue: OutboundQueue,
    registry: SubscriptionRegistry,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl Core {
    /// Hand the next queued frame to the writer if the queue allows it.
    fn release_next(&mut self) {
        if let Some(frame) = self.queue.drain(self.state) {
            tracing::trace!(
                target: "horizon_lattice_graphql::connection",
                remaining = self.queue.len(),
                "releasing frame"
            );
            if self.writer.send(WriterCommand::Queued(frame)).is_err() {
                tracing::debug!(
                    target: "horizon_lattice_graphql::connection",
                    "writer stopped, frame dropped"
                );
            }
        }
    }
}

/// State shared between the connection owner, its tasks and its
/// subscription streams.
pub(crate) struct ConnectionShared {
    codec: Arc<dyn MessageCodec>,
    start_ack_timeout: Option<Duration>,
    core: Mutex<Core>,
}

impl ConnectionShared {
    fn new(
        codec: Arc<dyn MessageCodec>,
        start_ack_timeout: Option<Duration>,
        writer: mpsc::UnboundedSender<WriterCommand>,
    ) -> Self {
        Self {
            codec,
            start_ack_timeout,
            core: Mutex::new(Core {
                state: ConnectionState::Initializing,
                queue: OutboundQueue::new(),
                registry: SubscriptionRegistry::new(),
                writer,
            }),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.core.lock().state
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.core.lock().registry.len()
    }

    /// Encode and send `message`.
    ///
    /// `connection_init` goes straight to the writer; every other message
    /// joins the outbound queue. Fails once the connection has terminated.
    pub(crate) fn queue_message(&self, message: ClientMessage) -> Result<()> {
        let text = self.codec.encode(&message)?;
        let mut core = self.core.lock();
        Self::queue_encoded(&mut core, &message, text)
    }

    fn queue_encoded(core: &mut Core, message: &ClientMessage, text: String) -> Result<()> {
        if core.state.is_terminated() {
            return Err(ClientError::ConnectionClosed);
        }
        match message {
            ClientMessage::ConnectionInit => core
                .writer
                .send(WriterCommand::Direct(text))
                .map_err(|_| ClientError::ConnectionClosed),
            other => {
                let starts = match other {
                    ClientMessage::Start { id, .. } => Some(id.clone()),
                    _ => None,
                };
                core.queue.enqueue(OutboundFrame::new(text, starts));
                core.release_next();
                Ok(())
            }
        }
    }

    /// Queue a frame produced while the lock is already held.
    fn queue_locked(&self, core: &mut Core, message: ClientMessage) {
        let result = self
            .codec
            .encode(&message)
            .and_then(|text| Self::queue_encoded(core, &message, text));
        if let Err(error) = result {
            tracing::warn!(
                target: "horizon_lattice_graphql::connection",
                kind = message.kind(),
                %error,
                "failed to queue frame"
            );
        }
    }

    /// Register `handler` under `id` and queue the `start` frame.
    ///
    /// The frame is encoded first, so an encoding failure leaves nothing
    /// registered.
    pub(crate) fn subscribe(
        &self,
        id: &str,
        request: GraphQLRequest,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<()> {
        let message = ClientMessage::start(id, request);
        let text = self.codec.encode(&message)?;

        let mut core = self.core.lock();
        if core.state.is_terminated() {
            return Err(ClientError::ConnectionClosed);
        }
        core.registry.register(id, handler)?;
        Self::queue_encoded(&mut core, &message, text)
    }

    /// Cancel the subscription `id`. Unknown ids are ignored.
    pub(crate) fn unsubscribe(&self, id: &str) {
        let mut core = self.core.lock();
        if let Some(stop) = core.registry.unregister(id) {
            self.queue_locked(&mut core, stop);
        }
    }

    /// Decode and process one inbound text frame. Undecodable frames are
    /// logged and dropped.
    pub(crate) fn process_frame(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(message) => self.process_message(message),
            Err(error) => tracing::warn!(
                target: "horizon_lattice_graphql::connection",
                %error,
                "dropping undecodable frame"
            ),
        }
    }

    pub(crate) fn process_message(&self, message: ServerMessage) {
        tracing::trace!(
            target: "horizon_lattice_graphql::connection",
            kind = message.kind(),
            id = ?message.id(),
            "frame received"
        );
        match message {
            ServerMessage::ConnectionAck => {
                let mut core = self.core.lock();
                match core.state {
                    ConnectionState::Initializing => {
                        core.state = ConnectionState::Active;
                        tracing::info!(
                            target: "horizon_lattice_graphql::connection",
                            queued = core.queue.len(),
                            "connection acknowledged"
                        );
                        core.release_next();
                    }
                    state => tracing::debug!(
                        target: "horizon_lattice_graphql::connection",
                        %state,
                        "ignoring connection_ack"
                    ),
                }
            }
            ServerMessage::ConnectionError { payload } => {
                let errors = payload
                    .map(|payload| payload.errors())
                    .unwrap_or_else(|| vec![ErrorData::new("connection rejected by server")]);
                self.process_error(ClientError::Response(errors));
            }
            other => {
                let mut core = self.core.lock();
                if let Some(stop) = dispatch(&mut core.registry, other) {
                    self.queue_locked(&mut core, stop);
                }
            }
        }
    }

    /// The writer finished sending the in-flight frame.
    fn send_completed(&self, frame: &OutboundFrame, result: Result<()>) {
        if let Err(error) = result {
            self.process_error(error);
            return;
        }

        let mut core = self.core.lock();
        core.queue.complete();
        if !self.codec.acknowledges_start()
            && let Some(id) = &frame.starts
            && let Some(stop) = core.registry.acknowledge(id)
        {
            self.queue_locked(&mut core, stop);
        }
        core.release_next();
    }

    /// How long a written `start` may wait for `start_ack`, if the codec
    /// expects one.
    fn start_ack_deadline(&self) -> Option<Duration> {
        self.start_ack_timeout.filter(|_| self.codec.acknowledges_start())
    }

    /// Give up on `id` if the server has still not acknowledged it.
    ///
    /// A waiting subscription fails with [`ClientError::Timeout`]; one that
    /// was cancelled while waiting is forgotten. Either way no `stop` is
    /// sent, as the server never registered the id.
    fn expire_start(&self, id: &str, timeout: Duration) {
        let mut core = self.core.lock();
        if !matches!(
            core.registry.state(id),
            Some(SubscriptionState::Initialized | SubscriptionState::Cancelled)
        ) {
            return;
        }
        tracing::debug!(
            target: "horizon_lattice_graphql::subscription",
            id = %id,
            "no start_ack, dropping subscription"
        );
        if let Some(handler) = core.registry.remove(id) {
            handler.on_error(ClientError::Timeout(format!(
                "no start_ack for subscription '{id}' within {timeout:?}"
            )));
        }
    }

    /// Terminate the connection, failing every live subscription with
    /// `error`. Does nothing if already terminated.
    pub(crate) fn process_error(&self, error: ClientError) {
        let mut core = self.core.lock();
        Self::terminate_locked(&mut core, error);
    }

    fn terminate_locked(core: &mut Core, error: ClientError) {
        if core.state.is_terminated() {
            return;
        }
        core.state = ConnectionState::Terminated;
        let dropped = core.queue.clear();
        let failed = core.registry.fail_all(&error);
        tracing::error!(
            target: "horizon_lattice_graphql::connection",
            %error,
            failed,
            dropped,
            "connection terminated"
        );
        let _ = core.writer.send(WriterCommand::Close(None));
    }

    /// Terminate if `connection_ack` has still not arrived.
    fn expire_handshake(&self, timeout: Duration) {
        let mut core = self.core.lock();
        if core.state == ConnectionState::Initializing {
            Self::terminate_locked(
                &mut core,
                ClientError::Timeout(format!("no connection_ack within {timeout:?}")),
            );
        }
    }

    /// Close on behalf of the owner: write `connection_terminate` and end
    /// every subscription stream without an error.
    fn shutdown(&self) {
        let terminate = self.codec.encode(&ClientMessage::ConnectionTerminate).ok();
        let mut core = self.core.lock();
        if core.state.is_terminated() {
            return;
        }
        core.state = ConnectionState::Terminated;
        core.queue.clear();
        core.registry.clear();
        let _ = core.writer.send(WriterCommand::Close(terminate));
        tracing::debug!(target: "horizon_lattice_graphql::connection", "connection closed");
    }
}

/// An open subscription socket.
///
/// Dropping it closes the socket.
pub(crate) struct Connection {
    shared: Arc<ConnectionShared>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connect, perform the websocket handshake and send `connection_init`.
    pub(crate) async fn open(config: &ConnectionConfig, codec: Arc<dyn MessageCodec>) -> Result<Self> {
        let request = build_request(config, codec.as_ref())?;
        let host = request.uri().host().unwrap_or_default().to_string();
        tracing::debug!(target: "horizon_lattice_graphql::connection", %host, "opening socket");

        let (socket, _response) = tokio::time::timeout(
            config.connection_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| ClientError::Timeout(format!("connecting to {host}")))??;

        tracing::info!(target: "horizon_lattice_graphql::connection", %host, "socket open");
        Ok(Self::start(socket, codec, config))
    }

    /// Spawn the reader and writer over an established socket.
    fn start<S>(socket: S, codec: Arc<dyn MessageCodec>, config: &ConnectionConfig) -> Self
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + 'static,
    {
        let (sink, stream) = socket.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ConnectionShared::new(codec, config.start_ack_timeout, writer_tx));

        tokio::spawn(write_loop(sink, writer_rx, Arc::downgrade(&shared)));
        let reader = tokio::spawn(read_loop(stream, Arc::downgrade(&shared)));

        if let Some(timeout) = config.ack_timeout {
            let weak = Arc::downgrade(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(shared) = weak.upgrade() {
                    shared.expire_handshake(timeout);
                }
            });
        }

        if let Err(error) = shared.queue_message(ClientMessage::ConnectionInit) {
            shared.process_error(error);
        }

        Self { shared, reader }
    }

    pub(crate) fn shared(&self) -> &Arc<ConnectionShared> {
        &self.shared
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.shutdown();
        self.reader.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("subscriptions", &self.shared.subscription_count())
            .finish()
    }
}

/// Build the upgrade request: codec URL (or override), subprotocol,
/// extensions and extra headers. The websocket key is generated here.
fn build_request(config: &ConnectionConfig, codec: &dyn MessageCodec) -> Result<Request> {
    let url = match &config.websocket_url {
        Some(url) => url.clone(),
        None => codec.connection_url(&config.endpoint)?,
    };
    let mut request = url.as_str().into_client_request()?;

    let headers = request.headers_mut();
    headers.insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_str(codec.subprotocol())?,
    );
    if let Some(extensions) = &config.extensions {
        headers.insert(SEC_WEBSOCKET_EXTENSIONS, HeaderValue::from_str(extensions)?);
    }
    for (name, value) in &config.headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(request)
}

async fn write_loop<S>(
    mut sink: S,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    shared: Weak<ConnectionShared>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Direct(text) => {
                tracing::trace!(target: "horizon_lattice_graphql::connection", frame = %text, "sending");
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    if let Some(shared) = shared.upgrade() {
                        shared.process_error(error.into());
                    }
                    break;
                }
            }
            WriterCommand::Queued(frame) => {
                tracing::trace!(target: "horizon_lattice_graphql::connection", frame = %frame.text, "sending");
                let result = sink
                    .send(Message::Text(frame.text.clone().into()))
                    .await
                    .map_err(ClientError::from);
                let failed = result.is_err();
                let Some(connection) = shared.upgrade() else {
                    break;
                };
                connection.send_completed(&frame, result);
                if failed {
                    break;
                }
                if let (Some(id), Some(timeout)) =
                    (frame.starts, connection.start_ack_deadline())
                {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        if let Some(connection) = shared.upgrade() {
                            connection.expire_start(&id, timeout);
                        }
                    });
                }
            }
            WriterCommand::Close(last) => {
                if let Some(text) = last {
                    tracing::trace!(target: "horizon_lattice_graphql::connection", frame = %text, "sending");
                    let _ = sink.send(Message::Text(text.into())).await;
                }
                let _ = sink.close().await;
                break;
            }
        }
    }
}

async fn read_loop<S>(mut stream: S, shared: Weak<ConnectionShared>)
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let error = loop {
        let next = stream.next().await;
        let Some(connection) = shared.upgrade() else {
            return;
        };
        match next {
            Some(Ok(Message::Text(text))) => connection.process_frame(text.as_str()),
            Some(Ok(Message::Binary(_))) => tracing::warn!(
                target: "horizon_lattice_graphql::connection",
                "ignoring binary frame"
            ),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|frame| format!(" ({}: {})", u16::from(frame.code), frame.reason.as_str()))
                    .unwrap_or_default();
                break ClientError::Transport(format!("server closed the connection{reason}"));
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => break ClientError::from(error),
            None => break ClientError::Transport("connection closed".into()),
        }
    };

    if let Some(connection) = shared.upgrade() {
        connection.process_error(error);
    }
}
