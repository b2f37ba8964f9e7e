use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::errors::{NavPlaneError, NavResult};
use crate::protocol::{ActionParams, ActionRequest, ActionResultPayload, Envelope};
use crate::registry::UiSnapshot;

pub type PeerId = u64;

/// Frames queued for one peer's socket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    pub connected: bool,
    pub client_count: usize,
}

struct PeerEntry {
    client_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    last_heartbeat: Instant,
}

struct PendingAction {
    request_id: String,
    peer: PeerId,
    reply: oneshot::Sender<ActionResultPayload>,
}

#[derive(Default)]
struct HubState {
    /// Keyed by connection order; the first live entry receives actions.
    peers: BTreeMap<PeerId, PeerEntry>,
    next_peer: PeerId,
    snapshot: Option<UiSnapshot>,
    /// Oldest first.
    pending: Vec<PendingAction>,
}

/// A registered peer's identity plus the receiving end of its outbound queue.
pub struct PeerConnection {
    pub id: PeerId,
    pub client_id: String,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

/// Server end of the session channel: every connected peer, the latest
/// snapshot any of them pushed and the requests awaiting a result.
pub struct ConnectionHub {
    state: Mutex<HubState>,
    action_timeout: Duration,
    heartbeat_timeout: Duration,
}

impl ConnectionHub {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            action_timeout: config.action_timeout(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }

    pub fn shared(config: &ServerConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn register_peer(&self) -> PeerConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_peer;
        state.next_peer += 1;
        let client_id = format!("client_{}_{}", id, &uuid::Uuid::new_v4().simple().to_string()[..8]);

        let welcome = Envelope::Heartbeat(serde_json::json!({
            "message": "Connected to NavPlane server",
            "clientId": client_id,
        }));
        match welcome.to_text() {
            Ok(text) => {
                let _ = tx.send(Outbound::Text(text));
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode welcome frame"),
        }

        state.peers.insert(
            id,
            PeerEntry {
                client_id: client_id.clone(),
                outbound: tx,
                last_heartbeat: Instant::now(),
            },
        );
        tracing::info!(client_id = %client_id, peers = state.peers.len(), "peer connected");
        PeerConnection {
            id,
            client_id,
            outbound: rx,
        }
    }

    /// Drops the peer and fails every request still waiting on it.
    pub fn remove_peer(&self, id: PeerId) {
        let mut state = self.state.lock();
        if let Some(peer) = state.peers.remove(&id) {
            let _ = peer.outbound.send(Outbound::Close);
            tracing::info!(client_id = %peer.client_id, peers = state.peers.len(), "peer disconnected");
        }
        let before = state.pending.len();
        state.pending.retain(|p| p.peer != id);
        let failed = before - state.pending.len();
        if failed > 0 {
            tracing::warn!(failed, "pending actions dropped with their peer");
        }
    }

    /// Routes one inbound text frame. Malformed frames are logged and ignored.
    pub fn handle_text(&self, id: PeerId, text: &str) {
        let frame = match Envelope::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(peer = id, error = %e, "ignoring malformed frame");
                return;
            }
        };

        let mut state = self.state.lock();
        if !state.peers.contains_key(&id) {
            return;
        }
        match frame {
            Envelope::UiState(mut snapshot) => {
                snapshot.timestamp = chrono::Utc::now().timestamp_millis();
                tracing::info!(
                    peer = id,
                    components = snapshot.components.len(),
                    visible = snapshot.currently_visible.len(),
                    "ui state update"
                );
                state.snapshot = Some(snapshot);
            }
            Envelope::ActionResult(result) => {
                // A result only settles requests sent to the peer that produced it.
                let position = match &result.request_id {
                    Some(rid) => state.pending.iter().position(|p| &p.request_id == rid && p.peer == id),
                    None => state.pending.iter().position(|p| p.peer == id),
                };
                match position {
                    Some(index) => {
                        let pending = state.pending.remove(index);
                        tracing::debug!(request_id = %pending.request_id, success = result.success, "action result");
                        let _ = pending.reply.send(result);
                    }
                    None => {
                        tracing::debug!(peer = id, request_id = ?result.request_id, "unsolicited action result")
                    }
                }
            }
            Envelope::Heartbeat(_) => {
                if let Some(peer) = state.peers.get_mut(&id) {
                    peer.last_heartbeat = Instant::now();
                }
            }
            Envelope::ActionRequest(_) => {
                tracing::warn!(peer = id, "peers cannot issue action requests");
            }
        }
    }

    /// Sends one request to the first live peer and waits for its result.
    pub async fn send_action(&self, action: &str, params: ActionParams) -> NavResult<ActionResultPayload> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            let (&peer, entry) = state
                .peers
                .iter()
                .find(|(_, entry)| !entry.outbound.is_closed())
                .ok_or(NavPlaneError::NoPeerConnected)?;

            let frame = Envelope::ActionRequest(ActionRequest::new(action, params).with_id(request_id.clone()));
            entry
                .outbound
                .send(Outbound::Text(frame.to_text()?))
                .map_err(|_| NavPlaneError::PeerDisconnected)?;
            tracing::info!(peer, request_id = %request_id, action = %action, "action sent");

            state.pending.push(PendingAction {
                request_id: request_id.clone(),
                peer,
                reply: reply_tx,
            });
        }

        match tokio::time::timeout(self.action_timeout, reply_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(NavPlaneError::PeerDisconnected),
            Err(_) => {
                self.state.lock().pending.retain(|p| p.request_id != request_id);
                tracing::warn!(request_id = %request_id, action = %action, "action timed out");
                Err(NavPlaneError::ActionTimeout(self.action_timeout))
            }
        }
    }

    pub fn current_ui_state(&self) -> Option<UiSnapshot> {
        self.state.lock().snapshot.clone()
    }

    pub fn status(&self) -> HubStatus {
        let count = self.state.lock().peers.len();
        HubStatus {
            connected: count > 0,
            client_count: count,
        }
    }

    /// Closes peers whose last heartbeat is older than the heartbeat timeout.
    pub fn reap_stale(&self) -> Vec<PeerId> {
        let now = Instant::now();
        let stale: Vec<PeerId> = self
            .state
            .lock()
            .peers
            .iter()
            .filter(|(_, peer)| now.duration_since(peer.last_heartbeat) > self.heartbeat_timeout)
            .map(|(&id, _)| id)
            .collect();
        for &id in &stale {
            tracing::info!(peer = id, "peer heartbeat timed out");
            self.remove_peer(id);
        }
        stale
    }

    /// Periodic reaper; stops once the hub is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let hub: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tick.tick().await;
                let Some(hub) = hub.upgrade() else {
                    break;
                };
                hub.reap_stale();
            }
        })
    }
}
