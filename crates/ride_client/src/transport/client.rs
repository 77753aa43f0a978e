//! Resilient connection to the matching service.
//!
//! `open` connects, sends the registration frame and hands the live socket to a
//! spawned driver task. The driver owns the socket and the reconnect loop; the
//! rest of the process talks to it through an [`OutboundChannel`] and observes
//! [`ConnectionState`] through a watch channel. Inbound frames are decoded and
//! routed to handlers registered per [`InboundKind`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use ride_core::message::{InboundKind, InboundMessage, OutboundMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connector::{SocketConnection, SocketConnector, SocketEvent, NORMAL_CLOSURE};
use super::error::TransportError;
use crate::config::ReconnectPolicy;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    ClosedFinal,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::ClosedFinal => "CLOSED_FINAL",
        };
        f.write_str(label)
    }
}

pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    handlers: RwLock<HashMap<InboundKind, Vec<MessageHandler>>>,
}

impl HandlerRegistry {
    fn register(&self, kind: InboundKind, handler: MessageHandler) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(handler);
    }

    fn dispatch(&self, message: &InboundMessage) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = handlers.get(&message.kind()) else {
            return 0;
        };
        for handler in registered {
            handler(message);
        }
        registered.len()
    }
}

enum Command {
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Close {
        reason: String,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable sending half of an open connection.
#[derive(Clone)]
pub struct OutboundChannel {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl OutboundChannel {
    /// Send an application message. Fails with `NotConnected` unless the state is OPEN.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        let open = *self.state.borrow() == ConnectionState::Open;
        if !open {
            return Err(TransportError::NotConnected);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { message, reply })
            .await
            .map_err(|_| TransportError::NotConnected)?;
        response.await.unwrap_or(Err(TransportError::NotConnected))
    }

    /// Close with the normal-closure code. No reconnect follows.
    pub async fn close(&self, reason: impl Into<String>) {
        let (reply, done) = oneshot::channel();
        let command = Command::Close {
            reason: reason.into(),
            reply,
        };
        if self.commands.send(command).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

/// Owns one logical connection to the matching service.
pub struct TransportClient<C: SocketConnector> {
    connector: Arc<C>,
    policy: ReconnectPolicy,
    handlers: Arc<HandlerRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    channel: Option<OutboundChannel>,
    driver: Option<JoinHandle<Result<(), TransportError>>>,
    cancel: CancellationToken,
}

impl<C: SocketConnector> TransportClient<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector: Arc::new(connector),
            policy,
            handlers: Arc::new(HandlerRegistry::default()),
            state: Arc::new(state),
            channel: None,
            driver: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Register a handler for one inbound message kind. Handlers run on the driver task.
    pub fn on_message<F>(&self, kind: InboundKind, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.handlers.register(kind, Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, register `identity`, and start the driver task.
    ///
    /// A failed first connection is returned to the caller and leaves the state
    /// DISCONNECTED; only established connections are reconnected automatically.
    pub async fn open(
        &mut self,
        identity: impl Into<String>,
    ) -> Result<OutboundChannel, TransportError> {
        if let Some(channel) = self.active_channel() {
            return Ok(channel);
        }
        let identity = identity.into();

        set_state(&self.state, ConnectionState::Connecting);
        let connection =
            match connect_and_register(self.connector.as_ref(), &identity, &self.policy).await {
                Ok(connection) => connection,
                Err(error) => {
                    warn!(%error, "Initial connection failed");
                    set_state(&self.state, ConnectionState::Disconnected);
                    return Err(error);
                }
            };
        set_state(&self.state, ConnectionState::Open);

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let session_cancel = self.cancel.child_token();
        let driver = Driver {
            connector: Arc::clone(&self.connector),
            identity,
            policy: self.policy.clone(),
            handlers: Arc::clone(&self.handlers),
            state: Arc::clone(&self.state),
            commands: receiver,
            cancel: session_cancel,
        };
        self.driver = Some(tokio::spawn(driver.run(connection)));

        let channel = OutboundChannel {
            commands,
            state: self.state.subscribe(),
        };
        self.channel = Some(channel.clone());
        Ok(channel)
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        match &self.channel {
            Some(channel) => channel.send(message).await,
            None => Err(TransportError::NotConnected),
        }
    }

    /// Close locally. The state becomes CLOSED_FINAL and no reconnect is scheduled.
    pub async fn close(&mut self, reason: impl Into<String>) -> Result<(), TransportError> {
        if let Some(channel) = self.channel.take() {
            channel.close(reason).await;
        }
        set_state(&self.state, ConnectionState::ClosedFinal);
        self.closed().await
    }

    /// Wait for the driver task to finish and return its terminal result.
    pub async fn closed(&mut self) -> Result<(), TransportError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        let outcome = driver.await;
        self.channel = None;
        match outcome {
            Ok(result) => result,
            Err(join_error) => Err(TransportError::Closed {
                code: super::connector::ABNORMAL_CLOSURE,
                reason: format!("transport task failed: {join_error}"),
            }),
        }
    }

    fn active_channel(&self) -> Option<OutboundChannel> {
        let running = self
            .driver
            .as_ref()
            .is_some_and(|driver| !driver.is_finished());
        if running {
            self.channel.clone()
        } else {
            None
        }
    }
}

impl<C: SocketConnector> Drop for TransportClient<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let previous = state.send_replace(next);
    if previous != next {
        info!(from = %previous, to = %next, "Transport state changed");
    }
}

async fn connect_and_register<C: SocketConnector>(
    connector: &C,
    identity: &str,
    policy: &ReconnectPolicy,
) -> Result<C::Connection, TransportError> {
    let mut connection = tokio::time::timeout(policy.connect_timeout, connector.connect())
        .await
        .map_err(|_| {
            TransportError::ConnectFailed(format!(
                "no connection within {:?}",
                policy.connect_timeout
            ))
        })??;

    let registration = OutboundMessage::registration(identity);
    let frame = registration
        .to_frame()
        .map_err(|err| TransportError::Encode(err.to_string()))?;
    if let Err(error) = connection.send(frame).await {
        connection
            .close(NORMAL_CLOSURE, "registration failed".to_string())
            .await;
        return Err(error);
    }
    debug!(identity, "Registration sent");
    Ok(connection)
}

enum SessionEnd {
    Local,
    Remote { code: u16, reason: String },
    Failed(String),
}

struct Driver<C: SocketConnector> {
    connector: Arc<C>,
    identity: String,
    policy: ReconnectPolicy,
    handlers: Arc<HandlerRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
}

impl<C: SocketConnector> Driver<C> {
    async fn run(mut self, mut connection: C::Connection) -> Result<(), TransportError> {
        let mut attempts: u32 = 0;
        loop {
            match self.pump(&mut connection).await {
                SessionEnd::Local => {
                    set_state(&self.state, ConnectionState::ClosedFinal);
                    return Ok(());
                }
                SessionEnd::Remote { code, reason } if code == NORMAL_CLOSURE => {
                    info!(code, %reason, "Matching service closed the connection");
                    set_state(&self.state, ConnectionState::ClosedFinal);
                    return Ok(());
                }
                SessionEnd::Remote { code, reason } => {
                    warn!(code, %reason, "Connection lost");
                }
                SessionEnd::Failed(reason) => {
                    warn!(%reason, "Transport error");
                }
            }

            connection = loop {
                if attempts >= self.policy.max_attempts {
                    error!(attempts, "Reconnect budget exhausted");
                    set_state(&self.state, ConnectionState::ClosedFinal);
                    self.reject_pending();
                    return Err(TransportError::ReconnectBudgetExhausted { attempts });
                }
                attempts += 1;
                set_state(&self.state, ConnectionState::Reconnecting);
                let delay = self.policy.delay_for(attempts);
                info!(
                    attempt = attempts,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                if !self.wait_offline(delay).await {
                    set_state(&self.state, ConnectionState::ClosedFinal);
                    return Ok(());
                }

                match connect_and_register(self.connector.as_ref(), &self.identity, &self.policy)
                    .await
                {
                    Ok(connection) => {
                        info!(attempt = attempts, "Reconnected");
                        attempts = 0;
                        set_state(&self.state, ConnectionState::Open);
                        break connection;
                    }
                    Err(error) => warn!(attempt = attempts, %error, "Reconnect attempt failed"),
                }
            };
        }
    }

    /// Serve one open connection until it ends.
    async fn pump(&mut self, connection: &mut C::Connection) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    connection.close(NORMAL_CLOSURE, "client shutting down".to_string()).await;
                    return SessionEnd::Local;
                }
                command = self.commands.recv() => match command {
                    None => {
                        connection.close(NORMAL_CLOSURE, "client dropped".to_string()).await;
                        return SessionEnd::Local;
                    }
                    Some(Command::Close { reason, reply }) => {
                        connection.close(NORMAL_CLOSURE, reason).await;
                        let _ = reply.send(());
                        return SessionEnd::Local;
                    }
                    Some(Command::Send { message, reply }) => {
                        let frame = match message.to_frame() {
                            Ok(frame) => frame,
                            Err(err) => {
                                let _ = reply.send(Err(TransportError::Encode(err.to_string())));
                                continue;
                            }
                        };
                        match connection.send(frame).await {
                            Ok(()) => {
                                debug!(message_type = message.type_tag(), "Frame sent");
                                let _ = reply.send(Ok(()));
                            }
                            Err(error) => {
                                let reason = error.to_string();
                                let _ = reply.send(Err(error));
                                return SessionEnd::Failed(reason);
                            }
                        }
                    }
                },
                event = connection.next_event() => match event {
                    SocketEvent::Message(frame) => self.dispatch(&frame),
                    SocketEvent::Closed { code, reason } => {
                        return SessionEnd::Remote { code, reason };
                    }
                    SocketEvent::Error(reason) => return SessionEnd::Failed(reason),
                },
            }
        }
    }

    /// Sleep out a backoff delay while answering commands. Returns false on local close.
    async fn wait_offline(&mut self, delay: std::time::Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                command = self.commands.recv() => match command {
                    None => return false,
                    Some(Command::Close { reply, .. }) => {
                        let _ = reply.send(());
                        return false;
                    }
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(TransportError::NotConnected));
                    }
                },
                _ = &mut sleep => return true,
            }
        }
    }

    fn reject_pending(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Send { reply, .. } => {
                    let _ = reply.send(Err(TransportError::NotConnected));
                }
                Command::Close { reply, .. } => {
                    let _ = reply.send(());
                }
            }
        }
    }

    fn dispatch(&self, frame: &str) {
        match InboundMessage::parse(frame) {
            Ok(InboundMessage::Unknown { kind, .. }) => {
                warn!(message_type = %kind, "Dropping message of unknown type");
            }
            Ok(message) => {
                let delivered = self.handlers.dispatch(&message);
                if delivered == 0 {
                    debug!(kind = ?message.kind(), "No handler registered for message");
                }
            }
            Err(error) => warn!(%error, "Dropping malformed frame"),
        }
    }
}
