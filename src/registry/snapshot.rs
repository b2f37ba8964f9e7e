use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::types::{ElementState, ElementType};

/// Serializable projection of one node. Handles and verbs never cross this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    pub current_state: ElementState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// The `ui_state` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSnapshot {
    pub components: Vec<ComponentInfo>,
    /// parent id → ordered child ids
    pub hierarchy: BTreeMap<String, Vec<String>>,
    pub currently_visible: Vec<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl UiSnapshot {
    pub fn component(&self, id: &str) -> Option<&ComponentInfo> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Hash of the snapshot topology: component count, sorted ids and sorted
    /// visible ids. Metadata, labels and states other than visibility are
    /// deliberately left out.
    pub fn structural_hash(&self) -> u64 {
        let mut ids: Vec<&str> = self.components.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        let mut visible: Vec<&str> = self.currently_visible.iter().map(String::as_str).collect();
        visible.sort_unstable();

        let mut hasher = DefaultHasher::new();
        self.components.len().hash(&mut hasher);
        ids.hash(&mut hasher);
        visible.hash(&mut hasher);
        hasher.finish()
    }
}
