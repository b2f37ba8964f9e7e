use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::PeerConfig;
use crate::engine::ActionEngine;
use crate::peer::session::PeerSession;

struct ActiveSession {
    url: String,
    generation: u64,
    leases: usize,
    session: Arc<PeerSession>,
}

#[derive(Default)]
struct ManagerState {
    active: Option<ActiveSession>,
    next_generation: u64,
}

/// Shares one [`PeerSession`] between every part of the host that wants it.
///
/// The session lives while at least one [`PeerLease`] for its URL is alive.
/// Acquiring a different URL replaces the session; leases on the old one
/// become inert.
pub struct ConnectionManager {
    engine: Arc<ActionEngine>,
    config: PeerConfig,
    state: Arc<Mutex<ManagerState>>,
}

pub struct PeerLease {
    generation: u64,
    session: Arc<PeerSession>,
    state: Weak<Mutex<ManagerState>>,
}

impl ConnectionManager {
    pub fn new(engine: Arc<ActionEngine>, config: PeerConfig) -> Self {
        Self {
            engine,
            config,
            state: Arc::new(Mutex::new(ManagerState::default())),
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn acquire(&self, url: &str) -> PeerLease {
        let mut state = self.state.lock();

        if let Some(active) = state.active.as_mut().filter(|a| a.url == url) {
            active.leases += 1;
            tracing::debug!(url = %url, leases = active.leases, "reusing peer session");
            return PeerLease {
                generation: active.generation,
                session: active.session.clone(),
                state: Arc::downgrade(&self.state),
            };
        }

        if let Some(previous) = state.active.take() {
            tracing::info!(from = %previous.url, to = %url, "replacing peer session");
            previous.session.disconnect();
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let session = Arc::new(PeerSession::spawn(
            self.engine.clone(),
            PeerConfig {
                url: url.to_string(),
                ..self.config.clone()
            },
        ));
        state.active = Some(ActiveSession {
            url: url.to_string(),
            generation,
            leases: 1,
            session: session.clone(),
        });
        PeerLease {
            generation,
            session,
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn active_url(&self) -> Option<String> {
        self.state.lock().active.as_ref().map(|a| a.url.clone())
    }

    pub fn lease_count(&self) -> usize {
        self.state.lock().active.as_ref().map_or(0, |a| a.leases)
    }
}

impl PeerLease {
    pub fn session(&self) -> &PeerSession {
        &self.session
    }
}

impl Drop for PeerLease {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        let Some(active) = state.active.as_mut().filter(|a| a.generation == self.generation) else {
            return;
        };
        active.leases -= 1;
        if active.leases == 0 {
            tracing::debug!(url = %active.url, "last lease released");
            active.session.disconnect();
            state.active = None;
        }
    }
}
