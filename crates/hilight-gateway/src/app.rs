use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hilight_bridge::{Collaborators, DefaultFinalizer, DefaultRouter, Supervisor, SupervisorHandle};
use hilight_core::{resolve_account, runnable_account_ids, HilightConfig, ResolvedAccount};
use hilight_sessions::SessionStore;

/// Accounts to run: the requested ids, or every runnable account when none
/// were named. Requested accounts that cannot run are skipped with a warning.
pub fn select_accounts(config: &HilightConfig, requested: &[String]) -> Vec<ResolvedAccount> {
    let ids = if requested.is_empty() {
        runnable_account_ids(config)
    } else {
        requested.to_vec()
    };

    ids.iter()
        .filter_map(|id| {
            let account = resolve_account(config, Some(id));
            if !account.enabled {
                warn!(account_id = %id, "account is disabled, skipping");
                return None;
            }
            if !account.configured {
                warn!(account_id = %id, reason = account.unconfigured_reason(), "account not configured, skipping");
                return None;
            }
            Some(account)
        })
        .collect()
}

/// Wire the default router, finaliser, session store and engine.
pub fn build_collaborators(config: &HilightConfig) -> anyhow::Result<Collaborators> {
    let engine =
        hilight_engine::build_engine(&config.engine).context("failed to build reply engine")?;
    info!(
        engine = engine.name(),
        agent_id = %config.routing.agent_id,
        store_path = %config.sessions.store_path,
        "collaborators ready"
    );

    Ok(Collaborators {
        router: Arc::new(DefaultRouter::new(config.routing.agent_id.clone())),
        finalizer: Arc::new(DefaultFinalizer),
        sessions: Arc::new(SessionStore::new(config.sessions.store_path.clone())),
        engine,
    })
}

/// Start one supervisor per account, all children of `root`.
pub fn start_supervisors(
    accounts: Vec<ResolvedAccount>,
    collab: &Collaborators,
    root: &CancellationToken,
) -> anyhow::Result<Vec<SupervisorHandle>> {
    accounts
        .into_iter()
        .map(|account| {
            let id = account.account_id.clone();
            let supervisor = Supervisor::new(account, collab.clone(), root)
                .with_context(|| format!("cannot start account {id}"))?;
            info!(account_id = %id, "starting relay supervisor");
            Ok(supervisor.start())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use hilight_core::config::{AccountConfig, EngineKind};

    use super::*;

    fn config() -> HilightConfig {
        let mut cfg = HilightConfig::default();
        cfg.accounts.insert(
            "default".into(),
            AccountConfig {
                ws_url: Some("ws://127.0.0.1:9100/ws".into()),
                ..Default::default()
            },
        );
        cfg.accounts.insert(
            "off".into(),
            AccountConfig {
                enabled: false,
                ws_url: Some("ws://127.0.0.1:9100/ws".into()),
                ..Default::default()
            },
        );
        cfg.accounts.insert("empty".into(), AccountConfig::default());
        cfg
    }

    #[test]
    fn all_runnable_accounts_by_default() {
        let ids: Vec<_> = select_accounts(&config(), &[])
            .into_iter()
            .map(|a| a.account_id)
            .collect();
        assert_eq!(ids, vec!["default"]);
    }

    #[test]
    fn requested_accounts_are_filtered() {
        let requested = vec!["off".to_string(), "empty".to_string(), "default".to_string()];
        let ids: Vec<_> = select_accounts(&config(), &requested)
            .into_iter()
            .map(|a| a.account_id)
            .collect();
        assert_eq!(ids, vec!["default"]);
    }

    #[test]
    fn openai_without_key_fails_to_build() {
        let mut cfg = config();
        cfg.engine.kind = EngineKind::OpenAi;
        assert!(build_collaborators(&cfg).is_err());
    }

    #[tokio::test]
    async fn supervisors_stop_with_root_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.sessions.store_path = dir.path().join("{agentId}.db").to_string_lossy().to_string();
        // Nothing listens here; supervisors sit in their reconnect loop.
        cfg.accounts.get_mut("default").unwrap().ws_url = Some("ws://127.0.0.1:9/ws".into());

        let collab = build_collaborators(&cfg).unwrap();
        let root = CancellationToken::new();
        let handles = start_supervisors(select_accounts(&cfg, &[]), &collab, &root).unwrap();
        assert_eq!(handles.len(), 1);

        root.cancel();
        assert_eq!(handles[0].stopped().await, "gateway shutdown");
    }
}
