//! WebSocket bridge between external clients and the internal [`EventBus`].
//!
//! This module provides [`WsBridge`], which:
//!
//! 1. **Ingests** rosbridge-style publish frames from clients and, for the
//!    wheel-command and joystick topics, republishes the decoded message on
//!    the bus:
//!
//!    ```json
//!    {"op": "publish", "topic": "/simulation_wrapper_node/wheel_cmd",
//!     "msg": {"vel_left": 0.4, "vel_right": 0.4}}
//!    ```
//!
//! 2. **Streams** every encoded image published on the image topic to each
//!    connected client as a text header followed by a binary WebSocket frame
//!    holding the encoded bytes:
//!
//!    ```json
//!    {"op": "publish", "topic": "/simulation_wrapper_node/simulation_images/compressed",
//!     "msg": {"format": "jpeg", "size": 18234}}
//!    ```
//!
//! Frames that cannot be decoded are logged and dropped; they never reach
//! the bus.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use simbridge_types::{BridgeError, CompressedImage, EventPayload, Joy, WheelsCmd};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;

/// Bridge between WebSocket clients and the bus topics of one node.
#[derive(Clone, Debug)]
pub struct WsBridge {
    bus: EventBus,
    wheel_cmd_topic: String,
    joy_topic: String,
    image_topic: String,
}

impl WsBridge {
    /// Create a bridge for the given (already resolved) topic names.
    pub fn new(
        bus: EventBus,
        wheel_cmd_topic: impl Into<String>,
        joy_topic: impl Into<String>,
        image_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            wheel_cmd_topic: wheel_cmd_topic.into(),
            joy_topic: joy_topic.into(),
            image_topic: image_topic.into(),
        }
    }

    // -----------------------------------------------------------------------
    // WebSocket server
    // -----------------------------------------------------------------------

    /// Bind `addr` and serve clients until a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the TCP listener cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve clients on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), BridgeError> {
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "websocket bridge listening");
        }
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BridgeError::Transport(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut images = self.bus.subscribe(&self.image_topic);

        loop {
            tokio::select! {
                // Forward encoded frames to the client.
                event = images.recv() => {
                    let Some(event) = event else { break };
                    if let EventPayload::CompressedImage(image) = event.payload {
                        let header = image_header(&self.image_topic, &image);
                        if ws_tx.send(Message::Text(header.into())).await.is_err()
                            || ws_tx.send(Message::Binary(image.data.into())).await.is_err()
                        {
                            break;
                        }
                    }
                }
                // Handle incoming WebSocket frames.
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_incoming_ws_message(text.as_str()) {
                                warn!(peer = %peer, error = %e, "dropping client message");
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }

    /// Decode one client text frame and republish it on the bus.
    ///
    /// Returns the number of bus receivers the message reached.  Frames with
    /// an `op` other than `"publish"` are ignored (`Ok(0)`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedCommand`] when the frame is not JSON,
    /// names an unknown topic, or its `msg` does not match the topic's
    /// message shape.
    pub fn handle_incoming_ws_message(&self, text: &str) -> Result<usize, BridgeError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| malformed("<ws>", e.to_string()))?;

        let op = json.get("op").and_then(|o| o.as_str()).unwrap_or("");
        if op != "publish" {
            debug!(op, "ignoring non-publish op");
            return Ok(0);
        }

        let topic = json
            .get("topic")
            .and_then(|t| t.as_str())
            .ok_or_else(|| malformed("<ws>", "missing \"topic\""))?;
        let msg = json
            .get("msg")
            .cloned()
            .ok_or_else(|| malformed(topic, "missing \"msg\""))?;

        let payload = if topic == self.wheel_cmd_topic {
            let cmd: WheelsCmd =
                serde_json::from_value(msg).map_err(|e| malformed(topic, e.to_string()))?;
            EventPayload::WheelsCmd(cmd)
        } else if topic == self.joy_topic {
            let joy: Joy =
                serde_json::from_value(msg).map_err(|e| malformed(topic, e.to_string()))?;
            EventPayload::Joy(joy)
        } else {
            return Err(malformed(topic, "topic is not accepted by this bridge"));
        };

        self.bus.publish(topic, payload)
    }
}

/// Text frame announcing the binary frame that follows it.
fn image_header(topic: &str, image: &CompressedImage) -> String {
    serde_json::json!({
        "op": "publish",
        "topic": topic,
        "msg": { "format": image.format, "size": image.data.len() },
    })
    .to_string()
}

fn malformed(topic: &str, reason: impl Into<String>) -> BridgeError {
    BridgeError::MalformedCommand {
        topic: topic.to_string(),
        reason: reason.into(),
    }
}
