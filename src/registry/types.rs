use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::handle::ElementHandle;
use crate::registry::verbs::{Verb, VerbTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Page,
    Button,
    Input,
    Textarea,
    Select,
    Checkbox,
    Toggle,
    Card,
    Dialog,
    Modal,
    Popover,
    List,
    Form,
    Tab,
    Accordion,
    Menu,
    Dropdown,
}

impl ElementType {
    pub const ALL: [ElementType; 17] = [
        ElementType::Page,
        ElementType::Button,
        ElementType::Input,
        ElementType::Textarea,
        ElementType::Select,
        ElementType::Checkbox,
        ElementType::Toggle,
        ElementType::Card,
        ElementType::Dialog,
        ElementType::Modal,
        ElementType::Popover,
        ElementType::List,
        ElementType::Form,
        ElementType::Tab,
        ElementType::Accordion,
        ElementType::Menu,
        ElementType::Dropdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Page => "page",
            ElementType::Button => "button",
            ElementType::Input => "input",
            ElementType::Textarea => "textarea",
            ElementType::Select => "select",
            ElementType::Checkbox => "checkbox",
            ElementType::Toggle => "toggle",
            ElementType::Card => "card",
            ElementType::Dialog => "dialog",
            ElementType::Modal => "modal",
            ElementType::Popover => "popover",
            ElementType::List => "list",
            ElementType::Form => "form",
            ElementType::Tab => "tab",
            ElementType::Accordion => "accordion",
            ElementType::Menu => "menu",
            ElementType::Dropdown => "dropdown",
        }
    }

    /// Overlays open and close through their state setter, not through clicks.
    pub fn is_overlay(&self) -> bool {
        matches!(
            self,
            ElementType::Popover | ElementType::Modal | ElementType::Dialog
        )
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown element type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    #[default]
    Visible,
    Hidden,
    Disabled,
    Loading,
    Error,
    Focused,
}

/// One addressable UI element as held by the registry.
#[derive(Clone)]
pub struct ElementNode {
    pub id: String,
    pub element_type: ElementType,
    pub label: String,
    pub state: ElementState,
    pub parent: Option<String>,
    /// Verb names the element advertises. Informational only.
    pub available_actions: Vec<String>,
    pub metadata: Map<String, Value>,
    pub handle: Option<Arc<dyn ElementHandle>>,
    pub verbs: VerbTable,
}

impl ElementNode {
    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").and_then(Value::as_str)
    }
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementNode")
            .field("id", &self.id)
            .field("type", &self.element_type)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("available_actions", &self.available_actions)
            .field("has_handle", &self.handle.is_some())
            .field("verbs", &self.verbs)
            .finish()
    }
}

/// Registration request from the hosting UI layer.
#[derive(Clone)]
pub struct ElementDescriptor {
    pub id: String,
    pub element_type: ElementType,
    pub label: String,
    pub parent: Option<String>,
    pub available_actions: Vec<String>,
    pub metadata: Map<String, Value>,
    pub handle: Option<Arc<dyn ElementHandle>>,
    pub verbs: VerbTable,
}

impl ElementDescriptor {
    pub fn new(id: impl Into<String>, element_type: ElementType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            element_type,
            label: label.into(),
            parent: None,
            available_actions: Vec::new(),
            metadata: Map::new(),
            handle: None,
            verbs: VerbTable::new(),
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the metadata bag. Non-object values are ignored.
    pub fn metadata(mut self, metadata: Value) -> Self {
        if let Value::Object(map) = metadata {
            self.metadata = map;
        }
        self
    }

    pub fn handle(mut self, handle: Arc<dyn ElementHandle>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn verb(mut self, name: impl Into<String>, verb: Arc<dyn Verb>) -> Self {
        self.verbs.insert(name, verb);
        self
    }

    pub fn verbs(mut self, verbs: VerbTable) -> Self {
        self.verbs = verbs;
        self
    }

    pub(crate) fn into_node(self) -> ElementNode {
        ElementNode {
            id: self.id,
            element_type: self.element_type,
            label: self.label,
            state: ElementState::Visible,
            parent: self.parent,
            available_actions: self.available_actions,
            metadata: self.metadata,
            handle: self.handle,
            verbs: self.verbs,
        }
    }
}

/// Shallow patch applied by `ElementRegistry::update_state`.
#[derive(Debug, Clone, Default)]
pub struct ElementPatch {
    pub label: Option<String>,
    pub state: Option<ElementState>,
    /// Replaces the whole metadata bag.
    pub metadata: Option<Map<String, Value>>,
    pub available_actions: Option<Vec<String>>,
}

impl ElementPatch {
    pub fn state(state: ElementState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindCriteria {
    pub element_type: Option<ElementType>,
    /// Case-insensitive substring of the label.
    pub label: Option<String>,
    pub parent: Option<String>,
    pub state: Option<ElementState>,
}

impl FindCriteria {
    pub fn matches(&self, node: &ElementNode) -> bool {
        if let Some(t) = self.element_type {
            if node.element_type != t {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if !node.label.to_lowercase().contains(&label.to_lowercase()) {
                return false;
            }
        }
        if let Some(parent) = &self.parent {
            if node.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(state) = self.state {
            if node.state != state {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { id: String },
    Unregistered { id: String },
    Updated { id: String },
    Cleared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_round_trips_through_str() {
        for t in ElementType::ALL {
            assert_eq!(t.as_str().parse::<ElementType>().unwrap(), t);
        }
        assert_eq!("Modal".parse::<ElementType>().unwrap(), ElementType::Modal);
        assert!("slider".parse::<ElementType>().is_err());
    }

    #[test]
    fn only_popover_modal_dialog_are_overlays() {
        let overlays: Vec<_> = ElementType::ALL.iter().filter(|t| t.is_overlay()).collect();
        assert_eq!(overlays.len(), 3);
        assert!(!ElementType::Dropdown.is_overlay());
    }

    #[test]
    fn criteria_label_match_is_case_insensitive_substring() {
        let node = ElementDescriptor::new("save", ElementType::Button, "Save Changes").into_node();
        let hit = FindCriteria {
            label: Some("changes".into()),
            ..FindCriteria::default()
        };
        let miss = FindCriteria {
            label: Some("cancel".into()),
            element_type: Some(ElementType::Button),
            ..FindCriteria::default()
        };
        assert!(hit.matches(&node));
        assert!(!miss.matches(&node));
    }
}
