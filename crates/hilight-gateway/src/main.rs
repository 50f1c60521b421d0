use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hilight_core::HilightConfig;

mod app;

/// Current version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Short git commit hash embedded at compile time by build.rs.
const GIT_SHA: &str = env!("HILIGHT_GIT_SHA");

/// Bridge HiLight relay conversations to the configured reply engine.
#[derive(Debug, Parser)]
#[command(name = "hilight-gateway", version)]
struct Args {
    /// Config file (defaults to $HILIGHT_CONFIG, then ~/.hilight/hilight.toml).
    #[arg(long)]
    config: Option<String>,

    /// Run only these accounts (repeatable). Defaults to every enabled and
    /// configured account.
    #[arg(long = "account", value_name = "ID")]
    accounts: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hilight_gateway=info,hilight_bridge=info".into()),
        )
        .init();

    info!(version = VERSION, git_sha = GIT_SHA, "hilight gateway starting");

    // load config: --config > HILIGHT_CONFIG env > ~/.hilight/hilight.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("HILIGHT_CONFIG").ok());
    let config = HilightConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        HilightConfig::default()
    });

    let accounts = app::select_accounts(&config, &args.accounts);
    if accounts.is_empty() {
        warn!("no enabled account with a ws_url; nothing to run");
        return Ok(());
    }

    let collab = app::build_collaborators(&config)?;
    let root = CancellationToken::new();
    let handles = app::start_supervisors(accounts, &collab, &root)?;

    let all_stopped = futures_util::future::join_all(handles.iter().map(|h| h.stopped()));
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
            for handle in &handles {
                handle.stop("gateway shutdown");
            }
        }
        _ = all_stopped => {
            info!("all supervisors stopped");
        }
    }
    root.cancel();

    for handle in &handles {
        let reason = handle.stopped().await;
        let snapshot = serde_json::to_string(&handle.snapshot())?;
        info!(account_id = handle.account_id(), reason = %reason, snapshot = %snapshot, "account stopped");
    }
    Ok(())
}
