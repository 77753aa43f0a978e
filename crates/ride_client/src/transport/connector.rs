//! Socket seam plus the newline-delimited JSON implementation over TCP.

use std::future::Future;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use super::error::TransportError;

/// Close code for a close the client asked for.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the peer vanished without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// One established socket. `next_event` must be cancel-safe.
pub trait SocketConnection: Send {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn next_event(&mut self) -> impl Future<Output = SocketEvent> + Send;

    fn close(&mut self, code: u16, reason: String) -> impl Future<Output = ()> + Send;
}

pub trait SocketConnector: Send + Sync + 'static {
    type Connection: SocketConnection + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// Connects to `addr` and exchanges one JSON object per line.
#[derive(Debug, Clone)]
pub struct TcpLineConnector {
    addr: String,
}

impl TcpLineConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl SocketConnector for TcpLineConnector {
    type Connection = TcpLineConnection;

    async fn connect(&self) -> Result<TcpLineConnection, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| TransportError::ConnectFailed(format!("{}: {err}", self.addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|err| TransportError::ConnectFailed(err.to_string()))?;
        let (read, write) = stream.into_split();
        Ok(TcpLineConnection {
            lines: BufReader::new(read).lines(),
            writer: write,
        })
    }
}

#[derive(Debug)]
pub struct TcpLineConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl SocketConnection for TcpLineConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let mut line = frame.into_bytes();
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn next_event(&mut self) -> SocketEvent {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return SocketEvent::Message(line),
                Ok(None) => {
                    return SocketEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "peer closed the connection".to_string(),
                    }
                }
                Err(err) => return SocketEvent::Error(err.to_string()),
            }
        }
    }

    async fn close(&mut self, code: u16, reason: String) {
        debug!(code, %reason, "Closing TCP line connection");
        let _ = self.writer.shutdown().await;
    }
}
