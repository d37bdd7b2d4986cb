//! Admin router tests, driven in-process with `oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

use enlivora_settlement::admin::{setup_admin_router, AdminState, StatusInfo};
use enlivora_settlement::blockchain::TxHash;
use enlivora_settlement::config::SettlementConfig;
use enlivora_settlement::settlement::{Operation, RedeemIntent, RedeemPhase, SettlementLedger};

const KEY: &str = "test-admin-key";

fn state(trigger: Option<Arc<Notify>>) -> (AdminState, Arc<SettlementLedger>) {
    let ledger = Arc::new(SettlementLedger::new(None));
    let state = AdminState {
        ledger: Arc::clone(&ledger),
        api_key: Arc::from(KEY),
        reconcile_trigger: trigger,
        info: Arc::new(StatusInfo::from_config(&SettlementConfig::default(), true)),
    };
    (state, ledger)
}

fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let (state, _) = state(None);
    let router = setup_admin_router(state);

    let (status, _) = send(router.clone(), get("/admin/status", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(router.clone(), get("/admin/status", Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/admin/status")
        .header("Authorization", KEY)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_key_accepts_nothing() {
    let (mut state, _) = state(None);
    state.api_key = Arc::from("");
    let router = setup_admin_router(state);

    let (status, _) = send(router.clone(), get("/admin/status", Some(""))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(router, get("/admin/status", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_reports_configuration() {
    let (state, ledger) = state(None);
    ledger.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();

    let (status, body) = send(setup_admin_router(state), get("/admin/status", Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["chain_id"], "SN_SEPOLIA");
    assert_eq!(body["merchant_configured"], true);
    assert_eq!(body["contracts"]["passport"], false);
    assert_eq!(body["compensation"], "manual");
    assert_eq!(body["reconciler_enabled"], false);
    assert_eq!(body["open_intents"], 1);
}

#[tokio::test]
async fn test_lists_and_filters_intents() {
    let (state, ledger) = state(None);
    let open = ledger.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();
    let done = ledger.open_intent(RedeemIntent::new("0x3", 20, "0x2", 5)).unwrap();
    for phase in [
        RedeemPhase::DebitSubmitted,
        RedeemPhase::DebitConfirmed,
        RedeemPhase::RewardSubmitted,
        RedeemPhase::Complete,
    ] {
        ledger.update_intent(done.id, |i| i.phase = phase).unwrap();
    }
    let router = setup_admin_router(state);

    let (status, body) = send(router.clone(), get("/admin/intents", Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(router.clone(), get("/admin/intents?open=true", Some(KEY))).await;
    let open_list = body.as_array().unwrap();
    assert_eq!(open_list.len(), 1);
    assert_eq!(open_list[0]["id"], open.id.to_string());

    let (status, body) = send(router.clone(), get(&format!("/admin/intents/{}", done.id), Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "complete");
    assert_eq!(body["points"], 20);

    let (status, _) = send(
        router,
        get(&format!("/admin/intents/{}", uuid::Uuid::new_v4()), Some(KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ledger_summary() {
    let (state, ledger) = state(None);
    ledger.complete(Operation::Credit, "order-1", TxHash::new("0x1")).unwrap();

    let (status, body) = send(setup_admin_router(state), get("/admin/ledger", Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed_entries"], 1);
    assert_eq!(body["open_intents"], 0);
}

#[tokio::test]
async fn test_reconcile_trigger() {
    let trigger = Arc::new(Notify::new());
    let (state, _) = state(Some(Arc::clone(&trigger)));

    let request = Request::builder()
        .method("POST")
        .uri("/admin/reconcile")
        .header("Authorization", format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(setup_admin_router(state), request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["triggered"], true);

    // the stored permit makes this resolve at once
    tokio::time::timeout(std::time::Duration::from_secs(1), trigger.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reconcile_without_reconciler_is_unavailable() {
    let (state, _) = state(None);
    let request = Request::builder()
        .method("POST")
        .uri("/admin/reconcile")
        .header("Authorization", format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(setup_admin_router(state), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
