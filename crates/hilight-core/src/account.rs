//! Account resolution: turns raw `[accounts.*]` tables into the read-only
//! descriptor a supervisor runs with.

use std::time::Duration;

use serde::Serialize;

use crate::config::{
    AccountConfig, DmPolicy, HilightConfig, DEFAULT_ACCOUNT_ID, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_MAX_MISSED_PONGS, DEFAULT_MAX_RECONNECT_INTERVAL_MS, DEFAULT_RECONNECT_INTERVAL_MS,
    MIN_RECONNECT_INTERVAL_MS,
};

/// Fully-defaulted account descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAccount {
    pub account_id: String,
    pub enabled: bool,
    /// `true` when a non-empty `ws_url` is set.
    pub configured: bool,
    pub ws_url: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_missed_pongs: u32,
    pub dm_policy: DmPolicy,
    pub allow_from: Vec<String>,
}

impl ResolvedAccount {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reason shown when the account cannot be started.
    pub fn unconfigured_reason(&self) -> &'static str {
        "ws_url is not set for this account"
    }

    /// Whether `user_id` may talk to the agent under this account's DM policy.
    pub fn allows_sender(&self, user_id: &str) -> bool {
        match self.dm_policy {
            DmPolicy::Open | DmPolicy::Pairing => true,
            DmPolicy::Allowlist => self
                .allow_from
                .iter()
                .any(|entry| entry == "*" || entry == user_id),
        }
    }
}

/// Resolve `account_id` (or the default account) against the config.
///
/// Missing accounts resolve to an enabled-but-unconfigured descriptor so the
/// caller can report a useful reason instead of failing lookup.
pub fn resolve_account(cfg: &HilightConfig, account_id: Option<&str>) -> ResolvedAccount {
    let id = account_id.unwrap_or(DEFAULT_ACCOUNT_ID).to_string();
    let fallback = AccountConfig::default();
    let acct = cfg.accounts.get(&id).unwrap_or(&fallback);

    let ws_url = acct
        .ws_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from);
    let auth_token = acct
        .auth_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(String::from);

    let base = acct
        .reconnect_interval_ms
        .unwrap_or(DEFAULT_RECONNECT_INTERVAL_MS)
        .max(MIN_RECONNECT_INTERVAL_MS);
    let max = acct
        .max_reconnect_interval_ms
        .unwrap_or(DEFAULT_MAX_RECONNECT_INTERVAL_MS)
        .max(MIN_RECONNECT_INTERVAL_MS)
        .max(base);

    ResolvedAccount {
        account_id: id,
        enabled: acct.enabled,
        configured: ws_url.is_some(),
        ws_url,
        auth_token,
        reconnect_interval_ms: base,
        max_reconnect_interval_ms: max,
        heartbeat_interval_ms: acct
            .heartbeat_interval_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        max_missed_pongs: acct
            .max_missed_pongs
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_MISSED_PONGS),
        dm_policy: acct.dm_policy,
        allow_from: acct.allow_from.iter().map(|e| e.normalized()).collect(),
    }
}

/// Ids of every enabled and configured account.
pub fn runnable_account_ids(cfg: &HilightConfig) -> Vec<String> {
    cfg.account_ids()
        .into_iter()
        .filter(|id| {
            let acct = resolve_account(cfg, Some(id));
            acct.enabled && acct.configured
        })
        .collect()
}
