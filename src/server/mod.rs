pub mod http;
pub mod hub;
pub mod mcp;
pub mod tools;
pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{AgentConfig, AppConfig};
use crate::errors::NavResult;
use crate::llm::registry::ProviderRegistry;
use crate::llm::tools::load_builtin_tools;
use crate::llm::types::ToolDef;

pub use hub::{ConnectionHub, HubStatus, Outbound, PeerConnection, PeerId};
pub use tools::UiToolHandlers;

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ConnectionHub>,
    pub tools: Arc<UiToolHandlers>,
    pub providers: Arc<ProviderRegistry>,
    pub tool_defs: Arc<Vec<ToolDef>>,
    pub agent: AgentConfig,
}

impl AppState {
    pub fn new(config: &AppConfig, providers: ProviderRegistry) -> NavResult<Self> {
        let hub = ConnectionHub::shared(&config.server);
        Ok(Self {
            tools: Arc::new(UiToolHandlers::new(hub.clone())),
            hub,
            providers: Arc::new(providers),
            tool_defs: Arc::new(load_builtin_tools()?),
            agent: config.agent.clone(),
        })
    }
}

/// Serves HTTP and the peer WebSocket on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> NavResult<()> {
    axum::serve(listener, http::router(state)).await?;
    Ok(())
}

async fn bind(config: &AppConfig) -> NavResult<(TcpListener, AppState)> {
    let addr = config.server.bind_addr()?;
    let providers = ProviderRegistry::from_config(config);
    let state = AppState::new(config, providers)?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "NavPlane server listening");
    tracing::info!("peer endpoint: ws://{addr}/ws");
    tracing::info!("chat endpoint: http://{addr}/api/chat");
    Ok((listener, state))
}

/// Binds the configured address, starts the peer reaper and serves forever.
pub async fn run_server(config: AppConfig) -> NavResult<()> {
    let (listener, state) = bind(&config).await?;
    let _reaper = state.hub.spawn_reaper(config.server.reap_interval());
    serve(listener, state).await
}

/// Serves MCP on stdio while peers and the HTTP surface keep running on the
/// configured address. Returns when the MCP client closes stdin.
pub async fn run_mcp(config: AppConfig) -> NavResult<()> {
    let (listener, state) = bind(&config).await?;
    let _reaper = state.hub.spawn_reaper(config.server.reap_interval());
    let server = mcp::NavPlaneMcp::new(&state);

    let http = tokio::spawn(serve(listener, state));
    let result = server.serve_stdio().await;
    http.abort();
    result?;
    tracing::info!("MCP client disconnected");
    Ok(())
}
