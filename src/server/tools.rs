use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent_engine::tools::{ToolExecutor, ToolResult};
use crate::engine::ActionStep;
use crate::protocol::{ActionParams, ActionResultPayload, CUSTOM_ACTION, NAVIGATION_PATH};
use crate::registry::{ComponentInfo, UiSnapshot};
use crate::server::hub::ConnectionHub;

const NO_UI_STATE: &str = "No UI state available. Make sure a desktop application is connected.";
const DEFAULT_WAIT_AFTER_MS: u64 = 300;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindArgs {
    query: String,
    #[serde(default, rename = "type")]
    component_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComponentArgs {
    component_id: String,
    #[serde(default)]
    wait_after: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeArgs {
    component_id: String,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectArgs {
    component_id: String,
    value: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomArgs {
    component_id: String,
    action_name: String,
    #[serde(default)]
    action_value: Option<Value>,
}

#[derive(Deserialize)]
struct PathArgs {
    steps: Vec<ActionStep>,
    #[serde(default)]
    description: String,
}

/// Backs the builtin tool catalog with the hub's snapshot and peer connection.
pub struct UiToolHandlers {
    hub: Arc<ConnectionHub>,
}

impl UiToolHandlers {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }

    pub fn get_ui_state(&self) -> ToolResult {
        let Some(state) = self.hub.current_ui_state() else {
            return ToolResult::fail(NO_UI_STATE);
        };
        let message = format!(
            "Found {} components, {} visible",
            state.components.len(),
            state.currently_visible.len()
        );
        ToolResult::ok(message, serde_json::to_value(&state).ok())
    }

    fn find_component(&self, args: FindArgs) -> ToolResult {
        let Some(state) = self.hub.current_ui_state() else {
            return ToolResult::fail(NO_UI_STATE);
        };
        let query = args.query.to_lowercase();
        let matches: Vec<Value> = state
            .components
            .iter()
            .filter(|c| {
                args.component_type
                    .as_deref()
                    .map_or(true, |t| c.element_type.as_str().eq_ignore_ascii_case(t))
            })
            .filter(|c| component_matches(c, &query))
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": c.element_type,
                    "label": c.label,
                    "state": c.current_state,
                    "availableActions": c.actions,
                    "description": c.description,
                })
            })
            .collect();

        if matches.is_empty() {
            let suffix = args
                .component_type
                .map(|t| format!(" of type \"{t}\""))
                .unwrap_or_default();
            return ToolResult::fail(format!("No components found matching \"{}\"{suffix}", args.query));
        }
        ToolResult::ok(
            format!("Found {} matching component(s)", matches.len()),
            Some(Value::Array(matches)),
        )
    }

    fn component_sitemap(&self) -> ToolResult {
        let Some(state) = self.hub.current_ui_state() else {
            return ToolResult::fail(NO_UI_STATE);
        };
        let pages: Vec<Value> = state
            .components
            .iter()
            .filter(|c| c.element_type == crate::registry::ElementType::Page)
            .map(|page| {
                let mut seen = HashSet::from([page.id.as_str()]);
                json!({
                    "id": page.id,
                    "label": page.label,
                    "children": subtree(&page.id, &state, &mut seen),
                })
            })
            .collect();

        let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &state.components {
            *by_type.entry(c.element_type.as_str()).or_default() += 1;
        }

        let message = format!(
            "Generated sitemap with {} pages and {} total components",
            pages.len(),
            state.components.len()
        );
        ToolResult::ok(
            message,
            Some(json!({
                "pages": pages,
                "totalComponents": state.components.len(),
                "componentsByType": by_type,
                "hierarchy": state.hierarchy,
            })),
        )
    }

    async fn relay(&self, action: &str, params: ActionParams, done: String, failed: String) -> ToolResult {
        match self.hub.send_action(action, params).await {
            Ok(result) => relay_result(result, done, failed),
            Err(e) => ToolResult::fail(failed).with_error(e.to_string()),
        }
    }

    async fn simple_action(&self, action: &str, verb_past: &str, verb_base: &str, args: ComponentArgs) -> ToolResult {
        let id = args.component_id.clone();
        let params = ActionParams {
            wait_after: args.wait_after,
            ..ActionParams::for_component(args.component_id)
        };
        self.relay(
            action,
            params,
            format!("Successfully {verb_past} {id}"),
            format!("Failed to {verb_base} {id}"),
        )
        .await
    }
}

fn component_matches(component: &ComponentInfo, query: &str) -> bool {
    component.id.to_lowercase().contains(query)
        || component.label.to_lowercase().contains(query)
        || component
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(query))
        || (!component.metadata.is_empty()
            && Value::Object(component.metadata.clone())
                .to_string()
                .to_lowercase()
                .contains(query))
}

fn subtree<'a>(parent: &str, state: &'a UiSnapshot, seen: &mut HashSet<&'a str>) -> Vec<Value> {
    let Some(children) = state.hierarchy.get(parent) else {
        return Vec::new();
    };
    children
        .iter()
        .filter_map(|child_id| state.component(child_id))
        .filter_map(|child| {
            if !seen.insert(child.id.as_str()) {
                return None;
            }
            Some(json!({
                "id": child.id,
                "type": child.element_type,
                "label": child.label,
                "actions": child.actions,
                "children": subtree(&child.id, state, seen),
            }))
        })
        .collect()
}

fn relay_result(result: ActionResultPayload, done: String, failed: String) -> ToolResult {
    let success = result.success;
    let error = result.error.clone();
    let data = serde_json::to_value(&result).ok();
    ToolResult {
        success,
        message: if success { done } else { failed },
        data,
        error,
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolResult> {
    serde_json::from_value(arguments).map_err(|e| {
        ToolResult::fail(format!("Invalid arguments for {tool}")).with_error(e.to_string())
    })
}

#[async_trait]
impl ToolExecutor for UiToolHandlers {
    async fn execute(&self, name: &str, arguments: Value) -> ToolResult {
        tracing::debug!(tool = %name, %arguments, "executing tool");
        let result = match name {
            "get_ui_state" => Ok(self.get_ui_state()),
            "get_component_sitemap" => Ok(self.component_sitemap()),
            "find_component" => parse_args(name, arguments).map(|args| self.find_component(args)),
            "click_component" => match parse_args::<ComponentArgs>(name, arguments) {
                Ok(mut args) => {
                    args.wait_after = args.wait_after.or(Some(DEFAULT_WAIT_AFTER_MS));
                    Ok(self.simple_action("click", "clicked", "click", args).await)
                }
                Err(e) => Err(e),
            },
            "clear_input" => match parse_args(name, arguments) {
                Ok(args) => Ok(self.simple_action("clear", "cleared", "clear", args).await),
                Err(e) => Err(e),
            },
            "open_component" => match parse_args(name, arguments) {
                Ok(args) => Ok(self.simple_action("open", "opened", "open", args).await),
                Err(e) => Err(e),
            },
            "close_component" => match parse_args(name, arguments) {
                Ok(args) => Ok(self.simple_action("close", "closed", "close", args).await),
                Err(e) => Err(e),
            },
            "scroll_to_component" => match parse_args(name, arguments) {
                Ok(args) => Ok(self.simple_action("scroll", "scrolled to", "scroll to", args).await),
                Err(e) => Err(e),
            },
            "type_text" => match parse_args::<TypeArgs>(name, arguments) {
                Ok(args) => {
                    let done = format!("Successfully typed \"{}\" into {}", args.text, args.component_id);
                    let failed = format!("Failed to type into {}", args.component_id);
                    let params = ActionParams {
                        text: Some(args.text),
                        ..ActionParams::for_component(args.component_id)
                    };
                    Ok(self.relay("type", params, done, failed).await)
                }
                Err(e) => Err(e),
            },
            "select_option" => match parse_args::<SelectArgs>(name, arguments) {
                Ok(args) => {
                    let done = format!("Successfully selected {} in {}", args.value, args.component_id);
                    let failed = format!("Failed to select option in {}", args.component_id);
                    let params = ActionParams {
                        value: Some(args.value),
                        ..ActionParams::for_component(args.component_id)
                    };
                    Ok(self.relay("select", params, done, failed).await)
                }
                Err(e) => Err(e),
            },
            "execute_custom_action" => match parse_args::<CustomArgs>(name, arguments) {
                Ok(args) => {
                    let done = format!(
                        "Successfully executed custom action \"{}\" on {}",
                        args.action_name, args.component_id
                    );
                    let failed = format!(
                        "Failed to execute custom action \"{}\" on {}",
                        args.action_name, args.component_id
                    );
                    let params = ActionParams {
                        action_name: Some(args.action_name),
                        action_value: args.action_value,
                        ..ActionParams::for_component(args.component_id)
                    };
                    Ok(self.relay(CUSTOM_ACTION, params, done, failed).await)
                }
                Err(e) => Err(e),
            },
            "execute_navigation_path" => match parse_args::<PathArgs>(name, arguments) {
                Ok(args) => {
                    let done = format!("Successfully executed navigation: {}", args.description);
                    let params = ActionParams {
                        steps: Some(args.steps),
                        description: Some(args.description),
                        ..ActionParams::default()
                    };
                    let mut result = self
                        .relay(NAVIGATION_PATH, params, done, "Failed to execute navigation path".into())
                        .await;
                    if !result.success && result.data.is_some() {
                        let cause = result.error.clone().unwrap_or_else(|| "Unknown error".into());
                        result.message = format!("Failed during navigation: {cause}");
                    }
                    Ok(result)
                }
                Err(e) => Err(e),
            },
            other => Err(ToolResult::fail(format!("Unknown tool: {other}"))),
        };
        result.unwrap_or_else(|failure| failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::Envelope;
    use crate::registry::{ElementDescriptor, ElementRegistry, ElementType};

    fn hub_with_editor() -> Arc<ConnectionHub> {
        let registry = ElementRegistry::new();
        registry
            .register(ElementDescriptor::new("editor", ElementType::Page, "Editor"))
            .unwrap();
        registry
            .register(
                ElementDescriptor::new("slider-1", ElementType::Input, "Exposure")
                    .parent("editor")
                    .metadata(json!({ "value": 10, "min": 0, "max": 100, "unit": "stops" })),
            )
            .unwrap();
        registry
            .register(
                ElementDescriptor::new("export-button", ElementType::Button, "Export")
                    .parent("editor")
                    .metadata(json!({ "description": "Save the edited photo" })),
            )
            .unwrap();
        registry
            .register(ElementDescriptor::new("export-dialog", ElementType::Dialog, "Export").parent("export-button"))
            .unwrap();

        let hub = ConnectionHub::shared(&ServerConfig::default());
        let peer = hub.register_peer();
        hub.handle_text(peer.id, &Envelope::UiState(registry.export_snapshot()).to_text().unwrap());
        hub
    }

    #[tokio::test]
    async fn get_ui_state_without_snapshot_fails() {
        let tools = UiToolHandlers::new(ConnectionHub::shared(&ServerConfig::default()));
        let result = tools.execute("get_ui_state", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.message, NO_UI_STATE);
    }

    #[tokio::test]
    async fn find_searches_description_and_metadata() {
        let tools = UiToolHandlers::new(hub_with_editor());

        let by_description = tools.execute("find_component", json!({ "query": "edited photo" })).await;
        assert_eq!(by_description.data.unwrap()[0]["id"], "export-button");

        let by_metadata = tools.execute("find_component", json!({ "query": "STOPS" })).await;
        assert_eq!(by_metadata.data.unwrap()[0]["id"], "slider-1");

        let typed = tools
            .execute("find_component", json!({ "query": "export", "type": "dialog" }))
            .await;
        let data = typed.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert_eq!(data[0]["id"], "export-dialog");

        let none = tools.execute("find_component", json!({ "query": "zzz", "type": "button" })).await;
        assert!(!none.success);
        assert!(none.message.contains("of type \"button\""));
    }

    #[tokio::test]
    async fn sitemap_nests_children_under_pages() {
        let tools = UiToolHandlers::new(hub_with_editor());
        let result = tools.execute("get_component_sitemap", json!({})).await;
        let data = result.data.unwrap();
        assert_eq!(data["totalComponents"], 4);
        assert_eq!(data["componentsByType"]["input"], 1);
        let page = &data["pages"][0];
        assert_eq!(page["id"], "editor");
        assert_eq!(page["children"][0]["id"], "slider-1");
        assert_eq!(page["children"][1]["children"][0]["id"], "export-dialog");
    }

    #[tokio::test]
    async fn bad_arguments_and_unknown_tools_are_failures() {
        let tools = UiToolHandlers::new(hub_with_editor());
        let bad = tools.execute("type_text", json!({ "componentId": "x" })).await;
        assert!(!bad.success);
        assert!(bad.message.contains("Invalid arguments"));

        let unknown = tools.execute("launch_rocket", json!({})).await;
        assert_eq!(unknown.message, "Unknown tool: launch_rocket");
    }
}
