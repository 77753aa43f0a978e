use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ride_client::transport::{SocketConnection, SocketConnector, SocketEvent, TransportError};
use serde_json::Value;
use tokio::sync::mpsc;

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Accept,
    Refuse,
}

#[derive(Debug, Default)]
struct Peer {
    events: Option<mpsc::UnboundedSender<SocketEvent>>,
    sent: Vec<String>,
    closed_with: Option<u16>,
}

#[derive(Debug, Default)]
struct Shared {
    plans: VecDeque<Plan>,
    connect_calls: usize,
    peers: Vec<Peer>,
}

/// In-memory connector. Refuses once the plan runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedConnector {
    pub fn new(plans: &[Plan]) -> Self {
        let connector = Self::default();
        connector.shared.lock().expect("lock").plans = plans.iter().copied().collect();
        connector
    }

    pub fn push_plans(&self, plans: &[Plan]) {
        self.shared.lock().expect("lock").plans.extend(plans.iter().copied());
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.lock().expect("lock").connect_calls
    }

    pub fn connections(&self) -> usize {
        self.shared.lock().expect("lock").peers.len()
    }

    /// Frames the client sent on accepted connection `index`.
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.shared.lock().expect("lock").peers[index].sent.clone()
    }

    /// `type` tags of the frames sent on connection `index`.
    pub fn sent_types(&self, index: usize) -> Vec<String> {
        self.sent(index)
            .iter()
            .map(|frame| {
                let value: Value = serde_json::from_str(frame).expect("sent frame is json");
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    pub fn closed_with(&self, index: usize) -> Option<u16> {
        self.shared.lock().expect("lock").peers[index].closed_with
    }

    /// Deliver an event to connection `index` as if the server produced it.
    pub fn emit(&self, index: usize, event: SocketEvent) {
        let shared = self.shared.lock().expect("lock");
        shared.peers[index]
            .events
            .as_ref()
            .expect("peer events")
            .send(event)
            .expect("connection alive");
    }
}

impl SocketConnector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> Result<ScriptedConnection, TransportError> {
        let mut shared = self.shared.lock().expect("lock");
        shared.connect_calls += 1;
        match shared.plans.pop_front().unwrap_or(Plan::Refuse) {
            Plan::Refuse => Err(TransportError::ConnectFailed("refused".into())),
            Plan::Accept => {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                shared.peers.push(Peer {
                    events: Some(events_tx),
                    ..Peer::default()
                });
                Ok(ScriptedConnection {
                    index: shared.peers.len() - 1,
                    shared: Arc::clone(&self.shared),
                    events: events_rx,
                })
            }
        }
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    index: usize,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketConnection for ScriptedConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().expect("lock");
        let peer = &mut shared.peers[self.index];
        if peer.closed_with.is_some() {
            return Err(TransportError::Send("connection closed".into()));
        }
        peer.sent.push(frame);
        Ok(())
    }

    async fn next_event(&mut self) -> SocketEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self, code: u16, _reason: String) {
        self.shared.lock().expect("lock").peers[self.index].closed_with = Some(code);
    }
}
