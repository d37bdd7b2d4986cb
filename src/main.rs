//! Enlivora settlement daemon.
//!
//! Runs the background pieces of the settlement core:
//!
//! ```text
//!   config (TOML + env) ──▶ ledger (JSON snapshot) ──▶ orchestrator ──▶ Starknet RPC
//!                                   ▲                        ▲
//!                                   │                        │
//!                      admin API ───┴──── reconciler ────────┘
//!                   (bearer auth)      (interval / on demand)
//! ```
//!
//! Mutating operations are driven by the storefront backend through the
//! library, or by hand through `settle-cli`.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use enlivora_settlement::admin::{self, AdminState, StatusInfo};
use enlivora_settlement::blockchain::ChainClient;
use enlivora_settlement::config::{load_or_default, validation::log_startup_warnings};
use enlivora_settlement::lifecycle::{build_orchestrator, wait_for_signal, Shutdown};
use enlivora_settlement::observability::{logging, metrics};
use enlivora_settlement::settlement::{Reconciler, SettlementLedger};

#[derive(Parser)]
#[command(name = "enlivora-settlement", version, about = "Enlivora Starknet settlement daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "enlivora-settlement starting");
    log_startup_warnings(&config);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let ledger = Arc::new(SettlementLedger::open(&config.ledger)?);
    let orchestrator = Arc::new(build_orchestrator(&config, Arc::clone(&ledger))?);

    let client = orchestrator.chain();
    if client.is_healthy().await {
        if let Err(e) = client.verify_chain_id().await {
            tracing::warn!(error = %e, "Chain ID check failed");
        }
    } else {
        tracing::warn!(rpc_url = %config.chain.rpc_url, "Starknet node unreachable at startup");
    }

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let reconcile_trigger = if config.reconciliation.enabled {
        let reconciler = Reconciler::new(Arc::clone(&orchestrator), config.reconciliation.clone());
        let trigger = reconciler.trigger();
        tasks.push(tokio::spawn(reconciler.run(shutdown.subscribe())));
        Some(trigger)
    } else {
        None
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            ledger: Arc::clone(&ledger),
            api_key: Arc::from(config.admin.api_key.as_str()),
            reconcile_trigger,
            info: Arc::new(StatusInfo::from_config(&config, client.signer_address().is_some())),
        };
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    wait_for_signal().await;
    tracing::info!(tasks = shutdown.receiver_count(), "Shutting down");
    shutdown.trigger();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
