//! MCP stdio surface: the builtin tool catalog plus two read-only resources.

use std::sync::Arc;

use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
    ListResourcesResult, ListToolsResult, PaginatedRequestParam, RawResource, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::{json, Value};

use crate::agent_engine::ToolExecutor;
use crate::llm::types::ToolDef;
use crate::server::hub::ConnectionHub;
use crate::server::tools::UiToolHandlers;
use crate::server::AppState;

pub const UI_STATE_URI: &str = "desktop://ui-state";
pub const CONNECTION_STATUS_URI: &str = "desktop://connection-status";

const SERVER_NAME: &str = "navplane";
const INSTRUCTIONS: &str = "Operates a connected application through its registered UI components. \
Call get_ui_state or find_component first to discover component ids, then act on them.";

#[derive(Clone)]
pub struct NavPlaneMcp {
    hub: Arc<ConnectionHub>,
    tools: Arc<UiToolHandlers>,
    catalog: Arc<Vec<ToolDef>>,
}

impl NavPlaneMcp {
    pub fn new(state: &AppState) -> Self {
        Self {
            hub: state.hub.clone(),
            tools: state.tools.clone(),
            catalog: state.tool_defs.clone(),
        }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        tracing::info!(tools = self.catalog.len(), "MCP server listening on stdio");
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    /// The embedded catalog in MCP form.
    pub fn tool_list(&self) -> Vec<Tool> {
        self.catalog
            .iter()
            .map(|def| {
                let schema = match &def.function.parameters {
                    Value::Object(map) => map.clone(),
                    _ => JsonObject::new(),
                };
                Tool::new(def.function.name.clone(), def.function.description.clone(), Arc::new(schema))
            })
            .collect()
    }

    /// Runs one tool and renders its result as pretty JSON. Failures are
    /// reported in the body, never as protocol errors.
    pub async fn call_text(&self, name: &str, arguments: Option<JsonObject>) -> String {
        let args = Value::Object(arguments.unwrap_or_default());
        tracing::info!(tool = %name, %args, "MCP tool call");
        let result = self.tools.execute(name, args).await;
        tracing::debug!(tool = %name, success = result.success, message = %result.message, "MCP tool result");
        serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.message.clone())
    }

    pub fn resource_list(&self) -> Vec<Resource> {
        vec![
            described(UI_STATE_URI, "Current UI State", "Live snapshot of the connected application UI"),
            described(
                CONNECTION_STATUS_URI,
                "Connection Status",
                "Status of controlled-application connections",
            ),
        ]
    }

    /// Body of a resource, or `None` for an unknown URI.
    pub fn resource_text(&self, uri: &str) -> Option<String> {
        let body = match uri {
            UI_STATE_URI => match self.hub.current_ui_state() {
                Some(snapshot) => serde_json::to_value(snapshot).unwrap_or(Value::Null),
                None => json!({ "message": "No UI state available" }),
            },
            CONNECTION_STATUS_URI => serde_json::to_value(self.hub.status()).unwrap_or(Value::Null),
            _ => return None,
        };
        Some(serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()))
    }
}

fn described(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name.to_string());
    raw.description = Some(description.to_string());
    raw.mime_type = Some("application/json".to_string());
    raw.no_annotation()
}

impl ServerHandler for NavPlaneMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::from_build_env()
            },
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tool_list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let text = self.call_text(&request.name, request.arguments).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult::with_all_items(self.resource_list()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = request.uri;
        tracing::debug!(uri = %uri, "MCP resource read");
        match self.resource_text(&uri) {
            Some(text) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(text, uri)],
            }),
            None => Err(ErrorData::resource_not_found(
                format!("Unknown resource: {uri}"),
                None,
            )),
        }
    }
}
