//! Operator admin API.
//!
//! Read-only views of the settlement ledger plus an on-demand reconciliation
//! trigger, all behind a bearer token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::{CompensationStrategy, SettlementConfig};
use crate::settlement::SettlementLedger;

/// Static facts reported by `/admin/status`.
#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub chain_id: String,
    pub merchant_configured: bool,
    pub contracts: ContractStatus,
    pub compensation: CompensationStrategy,
}

impl StatusInfo {
    pub fn from_config(config: &SettlementConfig, merchant_configured: bool) -> Self {
        Self {
            chain_id: config.chain.chain_id.clone(),
            merchant_configured,
            contracts: ContractStatus {
                passport: config.contracts.passport.is_some(),
                loyalty: config.contracts.loyalty.is_some(),
                rewards: config.contracts.rewards.is_some(),
            },
            compensation: config.reconciliation.compensation,
        }
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub ledger: Arc<SettlementLedger>,
    pub api_key: Arc<str>,
    /// `None` when the reconciler is not running.
    pub reconcile_trigger: Option<Arc<Notify>>,
    pub info: Arc<StatusInfo>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/intents", get(list_intents))
        .route("/admin/intents/{id}", get(get_intent))
        .route("/admin/ledger", get(get_ledger))
        .route("/admin/reconcile", post(trigger_reconcile))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
