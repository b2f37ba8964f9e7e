pub mod agent_engine;
pub mod config;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod server;

/// Installs the fmt subscriber (RUST_LOG, default `info`) and loads `.env` if present.
///
/// Logs go to stderr: stdout carries the MCP transport in `--mcp` mode.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
}
