use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admin::AdminState;
use crate::config::CompensationStrategy;
use crate::settlement::{LedgerSummary, RedeemIntent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub chain_id: String,
    pub merchant_configured: bool,
    pub contracts: ContractStatus,
    pub compensation: CompensationStrategy,
    pub reconciler_enabled: bool,
    pub open_intents: usize,
}

/// Which contract addresses are configured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContractStatus {
    pub passport: bool,
    pub loyalty: bool,
    pub rewards: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntentFilter {
    #[serde(default)]
    pub open: bool,
}

/// Pick up writes from other processes sharing the ledger file. A failed
/// refresh still serves what is in memory.
fn refresh(state: &AdminState) {
    if let Err(e) = state.ledger.refresh() {
        tracing::warn!(error = %e, "Failed to refresh settlement ledger");
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    refresh(&state);
    let info = &state.info;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        chain_id: info.chain_id.clone(),
        merchant_configured: info.merchant_configured,
        contracts: info.contracts,
        compensation: info.compensation,
        reconciler_enabled: state.reconcile_trigger.is_some(),
        open_intents: state.ledger.summary().open_intents,
    })
}

pub async fn list_intents(
    State(state): State<AdminState>,
    Query(filter): Query<IntentFilter>,
) -> Json<Vec<RedeemIntent>> {
    refresh(&state);
    let intents = if filter.open {
        state.ledger.open_intents()
    } else {
        state.ledger.intents()
    };
    Json(intents)
}

pub async fn get_intent(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RedeemIntent>, StatusCode> {
    refresh(&state);
    state.ledger.intent(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_ledger(State(state): State<AdminState>) -> Json<LedgerSummary> {
    refresh(&state);
    Json(state.ledger.summary())
}

/// Wake the reconciler for an immediate sweep.
pub async fn trigger_reconcile(
    State(state): State<AdminState>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let trigger = state.reconcile_trigger.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    trigger.notify_one();
    tracing::info!("Reconciliation requested via admin API");
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "triggered": true }))))
}
