use crate::registry::{ElementRegistry, UiSnapshot};

/// Change detection for periodic `ui_state` pushes.
///
/// Registry events only mark the state dirty; the hash comparison decides
/// whether a dirty tick produces a push.
#[derive(Debug, Default)]
pub struct SnapshotSync {
    last_hash: Option<u64>,
    dirty: bool,
}

impl SnapshotSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Unconditional snapshot (connect, after an action). Resets the baseline.
    pub fn force(&mut self, registry: &ElementRegistry) -> UiSnapshot {
        let snapshot = registry.export_snapshot();
        self.last_hash = Some(snapshot.structural_hash());
        self.dirty = false;
        snapshot
    }

    /// Snapshot to push on this tick, if the structure changed since the last push.
    pub fn poll(&mut self, registry: &ElementRegistry) -> Option<UiSnapshot> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        let snapshot = registry.export_snapshot();
        let hash = snapshot.structural_hash();
        if self.last_hash == Some(hash) {
            return None;
        }
        self.last_hash = Some(hash);
        Some(snapshot)
    }
}
