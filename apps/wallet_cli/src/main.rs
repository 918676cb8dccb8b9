use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insights::{gather, SimulatedActivitySource, SimulatedRiskSignals};
use shared::{domain::ProviderKind, error::ErrorReport};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wallet_core::{SessionError, SessionEvent, WalletSessionManager};
use wallet_provider::{JsonRpcProvider, SimulatedRelayProvider, StaticDetector};

mod config;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(about = "Connect to a wallet provider and inspect the session")]
struct Cli {
    #[arg(long, default_value = "wallet.toml")]
    config: PathBuf,
    /// Overrides the configured JSON-RPC endpoint.
    #[arg(long)]
    rpc_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect once and print the resulting session.
    Connect {
        #[arg(long, default_value = "metamask")]
        kind: ProviderKind,
    },
    /// Connect and follow session events until interrupted.
    Watch {
        #[arg(long, default_value = "metamask")]
        kind: ProviderKind,
    },
    /// Connect and print transaction history, chart data and a risk score.
    Insights {
        #[arg(long, default_value = "metamask")]
        kind: ProviderKind,
    },
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_or_report(manager: &Arc<WalletSessionManager>, kind: ProviderKind) -> Result<()> {
    match manager.connect(kind).await {
        Ok(session) => print_json(&session),
        Err(error) => {
            if let SessionError::Wallet(wallet_error) = &error {
                print_json(&ErrorReport::from(wallet_error))?;
            }
            Err(error).with_context(|| format!("failed to connect via {kind}"))
        }
    }
}

async fn watch(manager: &Arc<WalletSessionManager>, kind: ProviderKind) -> Result<()> {
    let mut events = manager.subscribe_events();
    connect_or_report(manager, kind).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("wallet_cli: interrupted, disconnecting");
                manager.disconnect().await;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(session)) => print_json(&session)?,
                Ok(SessionEvent::ChainChanged { chain_id, raw }) => {
                    info!(?chain_id, %raw, "wallet_cli: chain changed, rebuilding session");
                }
                Ok(SessionEvent::ProviderAvailability(available)) => {
                    info!(available, "wallet_cli: provider availability changed");
                }
                Ok(SessionEvent::Error(message)) => warn!(%message, "wallet_cli: session error"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "wallet_cli: dropped session events");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}

async fn print_insights(
    manager: &Arc<WalletSessionManager>,
    kind: ProviderKind,
    history_len: usize,
) -> Result<()> {
    connect_or_report(manager, kind).await?;
    let session = manager.snapshot().await;
    let activity = SimulatedActivitySource::new();
    let signals = SimulatedRiskSignals::new();
    match gather(&session, &activity, &signals, history_len)
        .await
        .context("failed to gather wallet insights")?
    {
        Some(insights) => print_json(&insights),
        None => {
            warn!("wallet_cli: session has no connected account");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = load_settings(&cli.config)?;
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = rpc_url;
    }
    init_tracing(&settings);
    settings.validate()?;

    let rpc = JsonRpcProvider::new(settings.rpc_url.clone());
    let manager = WalletSessionManager::new_with_dependencies(
        settings.session_config(),
        Arc::new(StaticDetector::new(rpc.clone())),
        Arc::new(SimulatedRelayProvider::new()),
    );
    manager.start().await;
    info!(rpc_url = %settings.rpc_url, "wallet_cli: session manager started");

    let result = match cli.command {
        Command::Connect { kind } => connect_or_report(&manager, kind).await,
        Command::Watch { kind } => {
            let watcher = rpc.spawn_change_watcher(settings.watch_interval());
            let result = watch(&manager, kind).await;
            watcher.abort();
            result
        }
        Command::Insights { kind } => print_insights(&manager, kind, settings.history_len).await,
    };

    manager.shutdown().await;
    result
}
