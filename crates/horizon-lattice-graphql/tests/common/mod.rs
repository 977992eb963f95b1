//! In-process `graphql-ws` server for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use horizon_lattice_graphql::{MessagePayload, ServerMessage};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, Uri};

/// How long a test waits for a frame it expects.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a test waits to be sure a frame is *not* coming.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Accepts websocket connections on an ephemeral local port.
pub struct TestServer {
    addr: std::net::SocketAddr,
    sockets: mpsc::UnboundedReceiver<ServerSocket>,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, sockets) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(socket) = ServerSocket::accept(stream).await {
                        let _ = tx.send(socket);
                    }
                });
            }
        });

        Self { addr, sockets }
    }

    /// The HTTP endpoint a client should be built with.
    pub fn endpoint(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> ServerSocket {
        tokio::time::timeout(RECV_TIMEOUT, self.sockets.recv())
            .await
            .expect("no client connected")
            .expect("server stopped")
    }
}

/// The server end of one client connection.
pub struct ServerSocket {
    ws: WebSocketStream<TcpStream>,
    /// Headers of the upgrade request.
    pub headers: HeaderMap,
    /// Request target of the upgrade request.
    pub uri: Uri,
}

impl ServerSocket {
    async fn accept(stream: TcpStream) -> Option<Self> {
        let mut captured = None;
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
                    response
                        .headers_mut()
                        .insert("sec-websocket-protocol", protocol.clone());
                }
                captured = Some((request.headers().clone(), request.uri().clone()));
                Ok(response)
            },
        )
        .await
        .ok()?;
        let (headers, uri) = captured?;
        Some(Self { ws, headers, uri })
    }

    /// Next text frame as JSON, or `None` if nothing arrives within `wait`
    /// or the client closed the socket.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
        loop {
            match tokio::time::timeout(wait, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    return Some(serde_json::from_str(text.as_str()).expect("client sent invalid JSON"));
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) | Err(_) => {
                    return None;
                }
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    /// Next text frame as JSON. Panics if none arrives.
    pub async fn recv(&mut self) -> Value {
        self.try_recv(RECV_TIMEOUT)
            .await
            .expect("expected a frame from the client")
    }

    /// Next frame, asserting its `type`.
    pub async fn expect(&mut self, kind: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["type"], kind, "unexpected frame {frame}");
        frame
    }

    pub async fn send(&mut self, frame: Value) {
        self.send_text(&frame.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    /// Read `connection_init` and reply with `connection_ack`.
    pub async fn handshake(&mut self) {
        self.expect("connection_init").await;
        self.send_message(ServerMessage::ConnectionAck).await;
    }

    /// Read a `start` frame and return its id.
    pub async fn expect_start(&mut self) -> String {
        let frame = self.expect("start").await;
        frame["id"].as_str().expect("start without id").to_string()
    }

    pub async fn send_message(&mut self, message: ServerMessage) {
        self.send_text(&message.to_json()).await;
    }

    pub async fn send_data(&mut self, id: &str, data: Value) {
        self.send_message(ServerMessage::Data {
            id: id.to_string(),
            payload: MessagePayload::new(json!({"data": data})),
        })
        .await;
    }
}
