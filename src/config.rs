use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{NavPlaneError, NavResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl AppConfig {
    pub fn validate(&self) -> NavResult<()> {
        self.server.validate()?;
        self.peer.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var NAVPLANE_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Plain conversational replies.
    pub chat: Option<RoleEntry>,
    /// Tool-calling model that drives the agentic loop.
    pub tools: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

/// Orchestration server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            action_timeout_ms: default_action_timeout_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            reap_interval_ms: default_reap_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> NavResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| NavPlaneError::Config(format!("invalid bind address '{}': {e}", self.bind)))
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn validate(&self) -> NavResult<()> {
        require_nonzero("server.reap_interval_ms", self.reap_interval_ms)
    }
}

/// Controlled-application side of the session channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_peer_url")]
    pub url: String,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub reconnect: bool,
    /// Push a fresh snapshot after every action result.
    #[serde(default = "default_true")]
    pub sync_after_action: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            url: default_peer_url(),
            sync_interval_ms: default_sync_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            action_timeout_ms: default_action_timeout_ms(),
            reconnect: true,
            sync_after_action: true,
        }
    }
}

impl PeerConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Tick periods must be non-zero; tokio timers panic on a zero period.
    pub fn validate(&self) -> NavResult<()> {
        require_nonzero("peer.sync_interval_ms", self.sync_interval_ms)?;
        require_nonzero("peer.heartbeat_interval_ms", self.heartbeat_interval_ms)
    }
}

fn require_nonzero(key: &str, value: u64) -> NavResult<()> {
    if value == 0 {
        return Err(NavPlaneError::Config(format!("{key} must be greater than zero")));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_settle_ms")]
    pub default_settle_ms: u64,
    /// Persist chat transcripts as JSONL under the data directory.
    #[serde(default)]
    pub record_history: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_settle_ms: default_settle_ms(),
            record_history: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3001".into()
}

fn default_peer_url() -> String {
    "ws://127.0.0.1:3001/ws".into()
}

fn default_sync_interval_ms() -> u64 {
    100
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_action_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_reap_interval_ms() -> u64 {
    10_000
}

fn default_max_iterations() -> u32 {
    25
}

fn default_settle_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn resolve_config_path() -> NavResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(NavPlaneError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn parse_config(content: &str) -> NavResult<AppConfig> {
    let mut config: AppConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub fn load_config() -> NavResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        provider = %config.llm.active_provider,
        bind = %config.server.bind,
        "config loaded"
    );
    Ok(config)
}

/// Loads config.toml, or falls back to defaults (plus env overrides) when it is missing or broken.
pub fn load_config_or_default() -> AppConfig {
    match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using default configuration");
            let mut cfg = AppConfig::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(bind) = std::env::var("NAVPLANE_BIND") {
        config.server.bind = bind;
    }
    if let Ok(url) = std::env::var("NAVPLANE_URL") {
        config.peer.url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_documented_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.peer.sync_interval(), Duration::from_millis(100));
        assert_eq!(cfg.peer.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(cfg.peer.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(cfg.server.action_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.server.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.agent.max_iterations, 25);
        assert_eq!(cfg.agent.default_settle_ms, 300);
        assert!(cfg.peer.reconnect);
    }

    #[test]
    fn provider_section_parses() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "Local"
            api_base = "http://127.0.0.1:8000/v1/chat/completions"
            model = "qwen"

            [llm.roles.tools]
            provider = "local"
            model = "qwen-tools"
            stream = true

            [server]
            bind = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.providers["local"].temperature, 0.1);
        assert!(cfg.llm.roles.tools.as_ref().unwrap().stream);
        assert_eq!(cfg.server.bind_addr().unwrap().port(), 9000);
    }

    #[test]
    fn bad_bind_address_is_a_config_error() {
        let server = ServerConfig {
            bind: "not-an-address".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(server.bind_addr(), Err(NavPlaneError::Config(_))));
    }

    #[test]
    fn zero_tick_periods_are_rejected() {
        for content in [
            "[peer]\nsync_interval_ms = 0",
            "[peer]\nheartbeat_interval_ms = 0",
            "[server]\nreap_interval_ms = 0",
        ] {
            match parse_config(content) {
                Err(NavPlaneError::Config(msg)) => assert!(msg.contains("greater than zero"), "{msg}"),
                other => panic!("expected a config error for {content:?}, got {other:?}"),
            }
        }
        assert!(parse_config("[peer]\nsync_interval_ms = 1").is_ok());
    }
}
