//! WebSocket transport: one JSON message per text frame.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::connector::{SocketConnection, SocketConnector, SocketEvent, ABNORMAL_CLOSURE};
use super::error::TransportError;

/// Close code for a close frame that carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Connects to a `ws://` endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Per-driver endpoint: `{base_url}/{driver_id}`.
    pub fn for_driver(base_url: &str, driver_id: &str) -> Self {
        Self::new(format!("{}/{driver_id}", base_url.trim_end_matches('/')))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SocketConnector for WebSocketConnector {
    type Connection = WebSocketConnection;

    async fn connect(&self) -> Result<WebSocketConnection, TransportError> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| TransportError::ConnectFailed(format!("{}: {err}", self.url)))?;
        debug!(url = %self.url, status = response.status().as_u16(), "WebSocket handshake complete");
        Ok(WebSocketConnection { stream })
    }
}

pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SocketConnection for WebSocketConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn next_event(&mut self) -> SocketEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return SocketEvent::Message(text),
                    Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => SocketEvent::Closed {
                            code: u16::from(frame.code),
                            reason: frame.reason.into_owned(),
                        },
                        None => SocketEvent::Closed {
                            code: NO_STATUS_RECEIVED,
                            reason: "close frame without status".to_string(),
                        },
                    };
                }
                // Pings are answered by the stream itself.
                Some(Ok(_)) => continue,
                Some(Err(err)) => return SocketEvent::Error(err.to_string()),
                None => {
                    return SocketEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "stream ended without a close frame".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: String) {
        debug!(code, %reason, "Closing WebSocket");
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        if let Err(err) = self.stream.close(Some(frame)).await {
            debug!(%err, "WebSocket close handshake failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NORMAL_CLOSURE;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn driver_endpoint_appends_the_id() {
        let connector = WebSocketConnector::for_driver("ws://localhost:8080/ws/driver/", "D7");
        assert_eq!(connector.url(), "ws://localhost:8080/ws/driver/D7");
    }

    #[tokio::test]
    async fn exchanges_text_frames_and_reports_close_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            let received = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected a text frame, got {other:?}"),
            };
            ws.send(Message::Text(
                r#"{"type":"SYSTEM_MESSAGE","message":"hi"}"#.to_string(),
            ))
            .await
            .expect("send");
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "shutting down".into(),
            }))
            .await
            .expect("close");
            received
        });

        let mut conn = WebSocketConnector::new(format!("ws://{addr}/ws/driver/D1"))
            .connect()
            .await
            .expect("connect");
        conn.send(r#"{"type":"DRIVER_REGISTER"}"#.to_string())
            .await
            .expect("send");

        assert_eq!(
            conn.next_event().await,
            SocketEvent::Message(r#"{"type":"SYSTEM_MESSAGE","message":"hi"}"#.to_string())
        );
        assert_eq!(
            conn.next_event().await,
            SocketEvent::Closed {
                code: NORMAL_CLOSURE,
                reason: "shutting down".to_string(),
            }
        );
        assert_eq!(
            server.await.expect("server"),
            r#"{"type":"DRIVER_REGISTER"}"#
        );
    }

    #[tokio::test]
    async fn refused_connection_is_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let result = WebSocketConnector::new(format!("ws://{addr}/ws/driver/D1"))
            .connect()
            .await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
