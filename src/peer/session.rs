use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::config::PeerConfig;
use crate::engine::ActionEngine;
use crate::errors::NavResult;
use crate::peer::actions::handle_action_request;
use crate::peer::sync::SnapshotSync;
use crate::protocol::{ActionResultPayload, Envelope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub connected: bool,
    pub url: String,
}

/// Controlled-application end of the session channel.
///
/// Owns a background task that connects, keeps the server's snapshot fresh,
/// executes inbound action requests and reconnects after transport failures
/// until [`PeerSession::disconnect`] is called or the session is dropped.
pub struct PeerSession {
    url: String,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PeerSession {
    /// Must be called from within a Tokio runtime.
    pub fn spawn(engine: Arc<ActionEngine>, config: PeerConfig) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let url = config.url.clone();
        let task = tokio::spawn(run(engine, config, connected.clone(), cancel.clone()));
        Self {
            url,
            connected,
            cancel,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            connected: self.is_connected(),
            url: self.url.clone(),
        }
    }

    /// Stops for good: closes the socket, tears down timers, no reconnect.
    pub fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(url = %self.url, "disconnecting peer session");
        }
        self.cancel.cancel();
    }

    /// Waits until the background task has exited.
    pub async fn closed(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "peer session task ended abnormally");
            }
        }
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    engine: Arc<ActionEngine>,
    config: PeerConfig,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    if let Err(e) = config.validate() {
        tracing::error!(url = %config.url, error = %e, "peer session not started");
        return;
    }

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = serve_connection(&engine, &config, &connected, &cancel) => result,
        };
        connected.store(false, Ordering::Release);

        match result {
            Ok(()) => tracing::info!(url = %config.url, "disconnected from server"),
            Err(e) => tracing::warn!(url = %config.url, error = %e, "session channel error"),
        }

        if cancel.is_cancelled() || !config.reconnect {
            break;
        }

        tracing::info!(delay_ms = config.reconnect_delay_ms, "reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_delay()) => {}
        }
    }
    connected.store(false, Ordering::Release);
    tracing::debug!(url = %config.url, "peer session stopped");
}

async fn serve_connection(
    engine: &Arc<ActionEngine>,
    config: &PeerConfig,
    connected: &AtomicBool,
    cancel: &CancellationToken,
) -> NavResult<()> {
    tracing::info!(url = %config.url, "connecting to server");
    let (ws, _) = connect_async(config.url.as_str()).await?;
    let _connected = ConnectedGuard::mark(connected);
    tracing::info!(url = %config.url, "connected to server");

    let (mut sink, mut stream) = ws.split();
    let registry = engine.registry().clone();
    let mut changes = registry.subscribe();
    let mut changes_open = true;
    let mut sync = SnapshotSync::new();

    send_frame(&mut sink, &Envelope::UiState(sync.force(&registry))).await?;
    tracing::debug!("sent initial ui state");

    let mut sync_tick = interval(config.sync_interval());
    sync_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let heartbeat_every = config.heartbeat_interval();
    let mut heartbeat_tick = interval_at(Instant::now() + heartbeat_every, heartbeat_every);

    // Dropping the set on disconnect aborts any action still running.
    let mut actions: JoinSet<ActionResultPayload> = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match Envelope::parse(&text) {
                    Ok(Envelope::ActionRequest(request)) => {
                        let engine = engine.clone();
                        let timeout = config.action_timeout();
                        actions.spawn(async move { handle_action_request(&engine, request, timeout).await });
                    }
                    Ok(Envelope::Heartbeat(data)) => {
                        tracing::debug!(%data, "heartbeat from server");
                    }
                    Ok(other) => {
                        tracing::warn!(kind = other.kind(), "unexpected frame from server");
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed frame"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            change = changes.recv(), if changes_open => match change {
                Ok(_) | Err(RecvError::Lagged(_)) => sync.mark_dirty(),
                Err(RecvError::Closed) => changes_open = false,
            },
            _ = sync_tick.tick() => {
                if let Some(snapshot) = sync.poll(&registry) {
                    tracing::debug!(components = snapshot.components.len(), "ui state changed, sending update");
                    send_frame(&mut sink, &Envelope::UiState(snapshot)).await?;
                }
            }
            _ = heartbeat_tick.tick() => {
                send_frame(&mut sink, &Envelope::heartbeat()).await?;
            }
            Some(joined) = actions.join_next(), if !actions.is_empty() => {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, "action task failed");
                        ActionResultPayload::failure(None, format!("action task failed: {e}"))
                    }
                };
                send_frame(&mut sink, &Envelope::ActionResult(result)).await?;
                if config.sync_after_action {
                    send_frame(&mut sink, &Envelope::UiState(sync.force(&registry))).await?;
                }
            }
        }
    }
}

/// Holds `connected` true for the lifetime of one connection, including
/// when the connection future is dropped or unwinds.
struct ConnectedGuard<'a>(&'a AtomicBool);

impl<'a> ConnectedGuard<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ConnectedGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Envelope) -> NavResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(frame.to_text()?)).await?;
    Ok(())
}
