use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::engine::dispatch::NativeVerb;
use crate::errors::{NavPlaneError, NavResult};
use crate::registry::handle::ElementHandle;
use crate::registry::snapshot::{ComponentInfo, UiSnapshot};
use crate::registry::types::{
    ElementDescriptor, ElementNode, ElementPatch, ElementState, FindCriteria, RegistryEvent,
};
use crate::registry::verbs::VerbTable;

const EVENT_BUFFER: usize = 256;

/// nodes + parent→children edges + visible set.
#[derive(Debug, Default)]
struct NavigationGraph {
    nodes: BTreeMap<String, ElementNode>,
    /// Authoritative child order. May be keyed by a parent that has not registered yet.
    edges: BTreeMap<String, Vec<String>>,
    visible: BTreeSet<String>,
}

/// Live registry of addressable UI elements.
///
/// The hosting UI layer is the only writer. The action engine and the
/// session channel read clones of nodes and snapshots; the lock is never
/// held across an await.
pub struct ElementRegistry {
    graph: RwLock<NavigationGraph>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            graph: RwLock::new(NavigationGraph::default()),
            events,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fires for every mutating call. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn register(&self, descriptor: ElementDescriptor) -> NavResult<()> {
        descriptor
            .verbs
            .validate()
            .map_err(|e| NavPlaneError::Registry(format!("{}: {e}", descriptor.id)))?;

        if descriptor.parent.as_deref() == Some(descriptor.id.as_str()) {
            return Err(NavPlaneError::Registry(format!(
                "{}: component cannot be its own parent",
                descriptor.id
            )));
        }

        for action in &descriptor.available_actions {
            if NativeVerb::parse(action).is_none() && !descriptor.verbs.contains(action) {
                tracing::warn!(
                    id = %descriptor.id,
                    action = %action,
                    "declared action has no native dispatch and no verb binding"
                );
            }
        }

        let id = descriptor.id.clone();
        let node = descriptor.into_node();
        {
            let mut graph = self.graph.write();
            if graph.nodes.contains_key(&id) {
                return Err(NavPlaneError::Registry(format!(
                    "{id}: already registered; unregister it first"
                )));
            }
            if let Some(parent) = &node.parent {
                let children = graph.edges.entry(parent.clone()).or_default();
                if !children.contains(&id) {
                    children.push(id.clone());
                }
            }
            graph.visible.insert(id.clone());
            tracing::debug!(id = %id, element_type = %node.element_type, "component registered");
            graph.nodes.insert(id.clone(), node);
        }

        self.notify(RegistryEvent::Registered { id });
        Ok(())
    }

    /// Returns false (and logs) when the id is unknown.
    pub fn unregister(&self, id: &str) -> bool {
        {
            let mut graph = self.graph.write();
            let Some(node) = graph.nodes.remove(id) else {
                tracing::debug!(id = %id, "unregister ignored: unknown component");
                return false;
            };
            if let Some(parent) = &node.parent {
                let now_empty = match graph.edges.get_mut(parent) {
                    Some(children) => {
                        children.retain(|child| child != id);
                        children.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    graph.edges.remove(parent);
                }
            }
            graph.visible.remove(id);
        }
        tracing::debug!(id = %id, "component unregistered");
        self.notify(RegistryEvent::Unregistered { id: id.to_string() });
        true
    }

    /// Shallow-merges the patch. Returns false (and warns) when the id is unknown.
    pub fn update_state(&self, id: &str, patch: ElementPatch) -> bool {
        {
            let mut graph = self.graph.write();
            let Some(node) = graph.nodes.get_mut(id) else {
                tracing::warn!(id = %id, "update ignored: component not found");
                return false;
            };
            if let Some(label) = patch.label {
                node.label = label;
            }
            if let Some(metadata) = patch.metadata {
                node.metadata = metadata;
            }
            if let Some(actions) = patch.available_actions {
                node.available_actions = actions;
            }
            if let Some(state) = patch.state {
                node.state = state;
                if state == ElementState::Hidden {
                    graph.visible.remove(id);
                } else {
                    graph.visible.insert(id.to_string());
                }
            }
        }
        self.notify(RegistryEvent::Updated { id: id.to_string() });
        true
    }

    /// Key-wise merge into the metadata bag.
    pub fn update_metadata(&self, id: &str, updates: Map<String, Value>) -> bool {
        let merged = {
            let graph = self.graph.read();
            let Some(node) = graph.nodes.get(id) else {
                tracing::warn!(id = %id, "metadata update ignored: component not found");
                return false;
            };
            let mut merged = node.metadata.clone();
            merged.extend(updates);
            merged
        };
        self.update_state(
            id,
            ElementPatch {
                metadata: Some(merged),
                ..ElementPatch::default()
            },
        )
    }

    /// Binds the live element once it has mounted.
    pub fn attach_handle(&self, id: &str, handle: Arc<dyn ElementHandle>) -> bool {
        {
            let mut graph = self.graph.write();
            let Some(node) = graph.nodes.get_mut(id) else {
                tracing::warn!(id = %id, "handle ignored: component not found");
                return false;
            };
            node.handle = Some(handle);
        }
        self.notify(RegistryEvent::Updated { id: id.to_string() });
        true
    }

    /// Replaces the verb table (closures are re-created on every render of the host).
    pub fn set_verbs(&self, id: &str, verbs: VerbTable) -> NavResult<bool> {
        verbs
            .validate()
            .map_err(|e| NavPlaneError::Registry(format!("{id}: {e}")))?;
        {
            let mut graph = self.graph.write();
            let Some(node) = graph.nodes.get_mut(id) else {
                tracing::warn!(id = %id, "verbs ignored: component not found");
                return Ok(false);
            };
            node.verbs = verbs;
        }
        self.notify(RegistryEvent::Updated { id: id.to_string() });
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<ElementNode> {
        self.graph.read().nodes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.graph.read().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().nodes.is_empty()
    }

    /// Child ids in insertion order.
    pub fn children_ids(&self, parent_id: &str) -> Vec<String> {
        self.graph
            .read()
            .edges
            .get(parent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn children(&self, parent_id: &str) -> Vec<ElementNode> {
        let graph = self.graph.read();
        graph
            .edges
            .get(parent_id)
            .map(|ids| ids.iter().filter_map(|id| graph.nodes.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Ids from the outermost registered ancestor down to `id`.
    pub fn path_to(&self, id: &str) -> Vec<String> {
        let graph = self.graph.read();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = graph.nodes.get(id);
        while let Some(node) = current {
            if !seen.insert(node.id.as_str()) {
                tracing::warn!(id = %id, "parent cycle detected while building path");
                break;
            }
            path.push(node.id.clone());
            current = node.parent.as_ref().and_then(|p| graph.nodes.get(p));
        }
        path.reverse();
        path
    }

    pub fn visible(&self) -> Vec<ElementNode> {
        let graph = self.graph.read();
        graph
            .visible
            .iter()
            .filter_map(|id| graph.nodes.get(id).cloned())
            .collect()
    }

    pub fn find(&self, criteria: &FindCriteria) -> Vec<ElementNode> {
        self.graph
            .read()
            .nodes
            .values()
            .filter(|node| criteria.matches(node))
            .cloned()
            .collect()
    }

    pub fn export_snapshot(&self) -> UiSnapshot {
        let graph = self.graph.read();
        let components = graph
            .nodes
            .values()
            .map(|node| ComponentInfo {
                id: node.id.clone(),
                element_type: node.element_type,
                label: node.label.clone(),
                parent: node.parent.clone(),
                actions: node.available_actions.clone(),
                current_state: node.state,
                description: node.description().map(str::to_string),
                metadata: node.metadata.clone(),
            })
            .collect();
        UiSnapshot {
            components,
            hierarchy: graph.edges.clone(),
            currently_visible: graph.visible.iter().cloned().collect(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Drops every node without touching subscribers or the session channel.
    pub fn clear(&self) {
        *self.graph.write() = NavigationGraph::default();
        tracing::debug!("registry cleared");
        self.notify(RegistryEvent::Cleared);
    }

    fn notify(&self, event: RegistryEvent) {
        // No receivers is fine: nothing is syncing yet.
        let _ = self.events.send(event);
    }
}
