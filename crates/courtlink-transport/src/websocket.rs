//! WebSocket relay adapter using `tokio-tungstenite`.
//!
//! Talks to a pub/sub relay over one WebSocket connection per channel:
//! an `attach` frame subscribes to the channel (carrying the opaque
//! bearer token when one is configured), the relay answers `attached`
//! with the assigned client id, and from then on `publish`/`deliver`
//! frames carry the lobby events. The token is only used to open the
//! connection — it never reaches the coordination logic.

use std::sync::Arc;
use std::time::Duration;

use courtlink_protocol::ClientId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Channel, ChannelMessage, Connector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time allowed for dial + attach before giving up.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Relay frames
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachFrame<'a> {
    action: &'static str,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Serialize)]
struct PublishFrame<'a> {
    action: &'static str,
    event: &'a str,
    data: serde_json::Value,
}

// Payloads ride as structured `Value`s: the internally tagged frame
// buffers its content for tag dispatch, which rules out zero-copy types
// like `RawValue` on the receive side.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum RelayFrame {
    #[serde(rename_all = "camelCase")]
    Attached { client_id: ClientId },
    Deliver { event: String, data: serde_json::Value },
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// A [`Connector`] that dials a pub/sub relay over WebSocket.
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Creates a connector for the given relay URL (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Attaches with the given opaque bearer credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the dial + attach timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn dial_and_attach(
        &self,
        channel: &str,
    ) -> Result<WebSocketChannel, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let attach = serde_json::to_string(&AttachFrame {
            action: "attach",
            channel,
            token: self.token.as_deref(),
        })
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        sink.send(Message::Text(attach.into()))
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        // Wait for the relay to acknowledge the attach.
        while let Some(frame) = stream.next().await {
            let msg = frame
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let Message::Text(text) = msg else {
                continue;
            };
            match serde_json::from_str::<RelayFrame>(&text) {
                Ok(RelayFrame::Attached { client_id }) => {
                    tracing::debug!(%client_id, channel, "attached to relay channel");
                    return Ok(WebSocketChannel {
                        id: client_id,
                        sink: Arc::new(Mutex::new(sink)),
                        stream,
                    });
                }
                Ok(RelayFrame::Error { message }) => {
                    return Err(TransportError::AttachRejected(message));
                }
                Ok(RelayFrame::Deliver { .. }) | Err(_) => {
                    // Traffic from before our attach completed; skip it.
                    continue;
                }
            }
        }

        Err(TransportError::ConnectFailed(
            "relay closed during attach".into(),
        ))
    }
}

impl Connector for WebSocketConnector {
    type Channel = WebSocketChannel;

    async fn connect(
        &self,
        channel: &str,
    ) -> Result<WebSocketChannel, TransportError> {
        tokio::time::timeout(self.connect_timeout, self.dial_and_attach(channel))
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A live relay subscription over one WebSocket connection.
pub struct WebSocketChannel {
    id: ClientId,
    /// Writer half, shared so `publish(&self)` works while `recv`
    /// holds the reader half exclusively.
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: SplitStream<WsStream>,
}

impl Channel for WebSocketChannel {
    async fn publish(
        &self,
        event: &str,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let data: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?;
        let frame = serde_json::to_string(&PublishFrame {
            action: "publish",
            event,
            data,
        })
        .map_err(|e| TransportError::PublishFailed(e.to_string()))?;

        self.sink
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelMessage> {
        while let Some(frame) = self.stream.next().await {
            let msg = match frame {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "relay connection errored");
                    return None;
                }
            };
            match msg {
                Message::Text(text) => match serde_json::from_str::<RelayFrame>(&text) {
                    Ok(RelayFrame::Deliver { event, data }) => {
                        match serde_json::to_vec(&data) {
                            Ok(bytes) => {
                                return Some(ChannelMessage { event, data: bytes });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping undeliverable payload");
                            }
                        }
                    }
                    Ok(RelayFrame::Error { message }) => {
                        tracing::warn!(message, "relay reported an error");
                    }
                    Ok(RelayFrame::Attached { .. }) | Err(_) => {
                        tracing::debug!("ignoring unexpected relay frame");
                    }
                },
                Message::Close(_) => return None,
                // Pings are answered by tungstenite during reads.
                _ => {}
            }
        }
        None
    }

    fn client_id(&self) -> &ClientId {
        &self.id
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Frame-shape tests. The relay's frame format is fixed by the
    //! deployed service, so these pin the exact JSON we emit and accept.

    use super::*;

    #[test]
    fn test_attach_frame_with_token() {
        let frame = AttachFrame {
            action: "attach",
            channel: "lobby:AB12CD",
            token: Some("opaque-bearer"),
        };
        let json: serde_json::Value =
            serde_json::to_value(&frame).unwrap();
        assert_eq!(json["action"], "attach");
        assert_eq!(json["channel"], "lobby:AB12CD");
        assert_eq!(json["token"], "opaque-bearer");
    }

    #[test]
    fn test_attach_frame_omits_missing_token() {
        let frame = AttachFrame {
            action: "attach",
            channel: "lobby:AB12CD",
            token: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("token"));
    }

    #[test]
    fn test_publish_frame_embeds_payload() {
        let frame = PublishFrame {
            action: "publish",
            event: "heartbeat",
            data: serde_json::json!({ "playerId": "c1" }),
        };
        let json: serde_json::Value =
            serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "heartbeat");
        assert_eq!(json["data"]["playerId"], "c1");
    }

    #[test]
    fn test_relay_frame_attached_parses_client_id() {
        let frame: RelayFrame =
            serde_json::from_str(r#"{"action":"attached","clientId":"c-17"}"#)
                .unwrap();
        match frame {
            RelayFrame::Attached { client_id } => {
                assert_eq!(client_id.as_str(), "c-17");
            }
            _ => panic!("expected attached frame"),
        }
    }

    #[test]
    fn test_relay_frame_deliver_parses_tagged_payload() {
        let frame: RelayFrame = serde_json::from_str(
            r#"{"action":"deliver","event":"case-selected","data":{"case":{"type":"civil","index":2,"title":"T"}}}"#,
        )
        .unwrap();
        match frame {
            RelayFrame::Deliver { event, data } => {
                assert_eq!(event, "case-selected");
                assert_eq!(data["case"]["type"], "civil");
            }
            _ => panic!("expected deliver frame"),
        }
    }

    #[test]
    fn test_delivered_payload_survives_reencoding() {
        // What `recv` hands the protocol layer must decode back to the
        // same payload the peer published.
        let frame: RelayFrame = serde_json::from_str(
            r#"{"action":"deliver","event":"heartbeat","data":{"playerId":"c1","timestamp":42}}"#,
        )
        .unwrap();
        let RelayFrame::Deliver { data, .. } = frame else {
            panic!("expected deliver frame");
        };
        let bytes = serde_json::to_vec(&data).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["playerId"], "c1");
        assert_eq!(decoded["timestamp"], 42);
    }

    #[test]
    fn test_relay_frame_unknown_action_fails() {
        let result: Result<RelayFrame, _> =
            serde_json::from_str(r#"{"action":"detach"}"#);
        assert!(result.is_err());
    }
}
