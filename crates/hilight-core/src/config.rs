use std::collections::BTreeMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Wire identity expected by the relay server.
pub const CHANNEL_ID: &str = "hi-light";
pub const PLUGIN_ID: &str = "hi-light";
pub const DEFAULT_ACCOUNT_ID: &str = "default";
pub const WS_UUID_PLACEHOLDER: &str = "{UUIDD}";

pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_MAX_RECONNECT_INTERVAL_MS: u64 = 30_000;
pub const MIN_RECONNECT_INTERVAL_MS: u64 = 1_000; // floor for both bounds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_MISSED_PONGS: u32 = 2;

/// Top-level config (hilight.toml + HILIGHT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HilightConfig {
    /// Relay accounts keyed by account id. One supervisor runs per enabled account.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Per-account relay connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// WebSocket URL template. `{UUIDD}` is replaced by a fresh UUID on every
    /// connection attempt; without it the UUID is appended as a path segment.
    pub ws_url: Option<String>,
    /// Sent verbatim as the `Authorization` header during the handshake.
    pub auth_token: Option<String>,
    pub reconnect_interval_ms: Option<u64>,
    pub max_reconnect_interval_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub max_missed_pongs: Option<u32>,
    #[serde(default)]
    pub dm_policy: DmPolicy,
    #[serde(default)]
    pub allow_from: Vec<AllowEntry>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: None,
            auth_token: None,
            reconnect_interval_ms: None,
            max_reconnect_interval_ms: None,
            heartbeat_interval_ms: None,
            max_missed_pongs: None,
            dm_policy: DmPolicy::default(),
            allow_from: Vec::new(),
        }
    }
}

/// Who may start a direct conversation through the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    #[default]
    Open,
    /// Pairing is negotiated by the relay host; the bridge accepts all senders.
    Pairing,
    /// Only ids listed in `allow_from` are accepted.
    Allowlist,
}

/// Allow-list entries may be written as strings or bare numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowEntry {
    Number(i64),
    Text(String),
}

impl AllowEntry {
    pub fn normalized(&self) -> String {
        match self {
            AllowEntry::Number(n) => n.to_string(),
            AllowEntry::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Agent that handles every relay conversation.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// SQLite path template; `{agentId}` is replaced by the routed agent id.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Echo,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system")]
    pub system: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_model(),
            system: default_system(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_agent_id() -> String {
    "main".to_string()
}
fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hilight/sessions/{{agentId}}.db", home)
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_system() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}

impl HilightConfig {
    /// Load config from a TOML file with HILIGHT_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `HILIGHT_ACCOUNTS__DEFAULT__AUTH_TOKEN=...`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::HilightError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("HILIGHT_").ignore(&["CONFIG"]).split("__"))
    }

    /// Account ids in config order; empty when no account is declared.
    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hilight/hilight.toml", home)
}
