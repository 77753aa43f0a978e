//! Connection to the matching service: socket seam, WebSocket and TCP line
//! transports, and the reconnecting client.

mod client;
mod connector;
mod error;
mod websocket;

pub use client::{ConnectionState, MessageHandler, OutboundChannel, TransportClient};
pub use connector::{
    SocketConnection, SocketConnector, SocketEvent, TcpLineConnection, TcpLineConnector,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
pub use error::TransportError;
pub use websocket::{WebSocketConnection, WebSocketConnector, NO_STATUS_RECEIVED};
