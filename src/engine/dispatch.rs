// Native verb dispatch: handle first where it makes sense, state setters otherwise.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::verbs::{FOCUS_SLOT, OPEN_SLOT, VALUE_SLOT};
use crate::registry::{ElementNode, ElementRegistry, ElementType, FindCriteria, HandleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeVerb {
    Click,
    Type,
    Clear,
    Focus,
    Blur,
    Scroll,
    Open,
    Close,
    Select,
    Toggle,
    Hover,
    Submit,
}

impl NativeVerb {
    pub const ALL: [NativeVerb; 12] = [
        NativeVerb::Click,
        NativeVerb::Type,
        NativeVerb::Clear,
        NativeVerb::Focus,
        NativeVerb::Blur,
        NativeVerb::Scroll,
        NativeVerb::Open,
        NativeVerb::Close,
        NativeVerb::Select,
        NativeVerb::Toggle,
        NativeVerb::Hover,
        NativeVerb::Submit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NativeVerb::Click => "click",
            NativeVerb::Type => "type",
            NativeVerb::Clear => "clear",
            NativeVerb::Focus => "focus",
            NativeVerb::Blur => "blur",
            NativeVerb::Scroll => "scroll",
            NativeVerb::Open => "open",
            NativeVerb::Close => "close",
            NativeVerb::Select => "select",
            NativeVerb::Toggle => "toggle",
            NativeVerb::Hover => "hover",
            NativeVerb::Submit => "submit",
        }
    }

    /// Exact, case-sensitive match on the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == name)
    }
}

impl fmt::Display for NativeVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) type DispatchResult = Result<(), String>;

pub(crate) async fn dispatch_native(
    registry: &ElementRegistry,
    node: &ElementNode,
    verb: NativeVerb,
    value: Option<&Value>,
) -> DispatchResult {
    match verb {
        NativeVerb::Click | NativeVerb::Open => click(node).await,
        NativeVerb::Type => type_text(node, &text_of(value)).await,
        NativeVerb::Clear => type_text(node, "").await,
        NativeVerb::Focus => focus(node).await,
        NativeVerb::Blur => with_handle(node, "blur", |h| h.blur()),
        NativeVerb::Scroll => with_handle(node, "scroll", |h| h.scroll_into_view(value)),
        NativeVerb::Close => close(registry, node).await,
        NativeVerb::Select => select(node, value.cloned().unwrap_or(Value::Null)).await,
        NativeVerb::Toggle => toggle(node).await,
        NativeVerb::Hover => with_handle(node, "hover", |h| h.hover()),
        NativeVerb::Submit => submit(registry, node).await,
    }
}

async fn invoke_slot(node: &ElementNode, slot: &str, value: Option<Value>) -> Option<DispatchResult> {
    let verb = node.verbs.get(slot)?;
    tracing::debug!(id = %node.id, slot, "dispatching through state setter");
    Some(verb.invoke(value).await.map_err(|e| e.to_string()))
}

fn with_handle<F>(node: &ElementNode, what: &str, op: F) -> DispatchResult
where
    F: FnOnce(&dyn crate::registry::ElementHandle) -> Result<(), HandleError>,
{
    match &node.handle {
        Some(handle) => op(handle.as_ref()).map_err(|e| format!("{what} on {}: {e}", node.id)),
        None => Err(format!("{what} on {}: element has no live handle", node.id)),
    }
}

async fn click(node: &ElementNode) -> DispatchResult {
    if node.element_type.is_overlay() {
        if let Some(result) = invoke_slot(node, OPEN_SLOT, Some(Value::Bool(true))).await {
            return result;
        }
    }
    if node.handle.is_some() {
        return with_handle(node, "click", |h| h.click());
    }
    if let Some(result) = invoke_slot(node, OPEN_SLOT, Some(Value::Bool(true))).await {
        return result;
    }
    Err(format!("no click handler for {}", node.id))
}

async fn type_text(node: &ElementNode, text: &str) -> DispatchResult {
    if let Some(result) = invoke_slot(node, VALUE_SLOT, Some(Value::String(text.to_string()))).await {
        return result;
    }
    with_handle(node, "type", |h| h.set_text(text))
}

async fn focus(node: &ElementNode) -> DispatchResult {
    if let Some(result) = invoke_slot(node, FOCUS_SLOT, None).await {
        return result;
    }
    with_handle(node, "focus", |h| h.focus())
}

async fn close(registry: &ElementRegistry, node: &ElementNode) -> DispatchResult {
    if let Some(result) = invoke_slot(node, OPEN_SLOT, Some(Value::Bool(false))).await {
        return result;
    }
    let close_button = registry
        .find(&FindCriteria {
            parent: Some(node.id.clone()),
            label: Some("close".into()),
            ..FindCriteria::default()
        })
        .into_iter()
        .next();
    match close_button {
        Some(button) => click(&button).await,
        None => Err(format!("no way to close {}", node.id)),
    }
}

async fn select(node: &ElementNode, value: Value) -> DispatchResult {
    if let Some(result) = invoke_slot(node, VALUE_SLOT, Some(value.clone())).await {
        return result;
    }
    with_handle(node, "select", |h| h.select(&value))
}

async fn toggle(node: &ElementNode) -> DispatchResult {
    let current = node.metadata.get("value").and_then(Value::as_bool).unwrap_or(false);
    if let Some(result) = invoke_slot(node, VALUE_SLOT, Some(Value::Bool(!current))).await {
        return result;
    }
    with_handle(node, "toggle", |h| h.toggle())
}

async fn submit(registry: &ElementRegistry, node: &ElementNode) -> DispatchResult {
    if let Some(handle) = &node.handle {
        match handle.submit() {
            Ok(()) => return Ok(()),
            Err(HandleError::Unsupported(_)) => {}
            Err(e) => return Err(format!("submit on {}: {e}", node.id)),
        }
    }
    let submit_button = registry
        .find(&FindCriteria {
            parent: Some(node.id.clone()),
            element_type: Some(ElementType::Button),
            ..FindCriteria::default()
        })
        .into_iter()
        .find(|b| b.metadata.get("type").and_then(Value::as_str) == Some("submit"));
    match submit_button {
        Some(button) => click(&button).await,
        None => Err(format!("no way to submit {}", node.id)),
    }
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
