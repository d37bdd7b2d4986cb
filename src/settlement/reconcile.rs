//! Background sweep over redemptions stuck between phases.
//!
//! Each sweep looks at open intents that have not changed for
//! `stale_after_secs` and drives them forward using transaction status
//! lookups, then applies the configured compensation strategy to intents
//! whose points were debited without a reward landing. A re-credit already
//! on its way is only ever resolved by status, never sent a second time.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::blockchain::chain::ChainClient;
use crate::blockchain::types::{TxHash, TxStatus};
use crate::config::{CompensationStrategy, ReconciliationConfig};
use crate::observability::metrics;
use crate::resilience::calculate_backoff;
use crate::settlement::ledger::LedgerError;
use crate::settlement::orchestrator::SettlementOrchestrator;
use crate::settlement::redeem::{unix_now, FailureStage, RedeemIntent, RedeemPhase};

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub debits_confirmed: usize,
    pub debits_failed: usize,
    pub rewards_completed: usize,
    pub rewards_failed: usize,
    pub rewards_retried: usize,
    pub compensated: usize,
    pub pending: usize,
    /// Intents that need an operator.
    pub stranded: Vec<Uuid>,
    pub errors: usize,
}

pub struct Reconciler<C: ChainClient> {
    orchestrator: Arc<SettlementOrchestrator<C>>,
    config: ReconciliationConfig,
    trigger: Arc<Notify>,
}

impl<C: ChainClient> Reconciler<C> {
    pub fn new(orchestrator: Arc<SettlementOrchestrator<C>>, config: ReconciliationConfig) -> Self {
        Self {
            orchestrator,
            config,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Handle that wakes the loop for an immediate sweep.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    /// Run until shutdown, sweeping on the interval or when triggered.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Reconciler disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            stale_after_secs = self.config.stale_after_secs,
            compensation = ?self.config.compensation,
            "Starting reconciler"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => tracing::info!("Reconciliation triggered"),
                _ = shutdown.recv() => break,
            }

            let report = self.sweep_once().await;
            if report.errors == 0 {
                consecutive_failures = 0;
                continue;
            }

            consecutive_failures = consecutive_failures.saturating_add(1);
            let delay = calculate_backoff(
                consecutive_failures,
                self.config.backoff_base_ms,
                self.config.backoff_max_ms,
            );
            tracing::warn!(
                errors = report.errors,
                consecutive_failures,
                delay_ms = delay.as_millis() as u64,
                "Reconciliation sweep had errors, backing off"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Reconciler stopped");
    }

    /// One pass over all stale open intents.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = unix_now();
        let mut report = SweepReport::default();

        // redeems started by other processes sharing the ledger file
        if let Err(e) = self.orchestrator.ledger().refresh() {
            report.errors += 1;
            tracing::warn!(error = %e, "Failed to refresh settlement ledger");
        }

        for intent in self.orchestrator.ledger().open_intents() {
            if intent.idle_secs(now) < self.config.stale_after_secs {
                continue;
            }
            report.examined += 1;
            self.reconcile(intent, &mut report).await;
        }

        metrics::record_open_intents(self.orchestrator.ledger().summary().open_intents);
        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                pending = report.pending,
                stranded = report.stranded.len(),
                errors = report.errors,
                "Reconciliation sweep finished"
            );
        }
        report
    }

    async fn reconcile(&self, intent: RedeemIntent, report: &mut SweepReport) {
        let ledger = self.orchestrator.ledger();
        let mut intent = intent;

        match intent.phase {
            RedeemPhase::Idle => {
                // crashed between writing the intent and recording the debit
                tracing::error!(
                    intent_id = %intent.id,
                    user = %intent.user,
                    "Redeem intent has no recorded debit; check the chain manually"
                );
                self.strand(&intent, report);
                return;
            }
            RedeemPhase::DebitSubmitted => {
                let Some(tx) = intent.debit_tx.clone() else {
                    self.strand(&intent, report);
                    return;
                };
                match self.status(&tx, report).await {
                    Some(TxStatus::Succeeded) => {
                        match ledger.update_intent(intent.id, |i| i.phase = RedeemPhase::DebitConfirmed) {
                            Ok(updated) => intent = updated,
                            Err(e) => return self.ledger_error(&intent, e, report),
                        }
                        report.debits_confirmed += 1;
                        metrics::record_reconcile_action("confirm_debit");
                    }
                    Some(TxStatus::Reverted(reason)) => {
                        if let Err(e) = ledger.update_intent(intent.id, |i| {
                            i.phase = RedeemPhase::Failed {
                                stage: FailureStage::Debit,
                            };
                            i.last_error = Some(format!("debit reverted: {}", reason));
                        }) {
                            return self.ledger_error(&intent, e, report);
                        }
                        report.debits_failed += 1;
                        metrics::record_reconcile_action("fail_debit");
                        tracing::info!(intent_id = %intent.id, debit_tx = %tx, "Debit reverted, nothing was charged");
                        return;
                    }
                    Some(TxStatus::Pending) => {
                        report.pending += 1;
                        return;
                    }
                    None => return,
                }
            }
            RedeemPhase::RewardSubmitted => {
                let Some(tx) = intent.reward_tx.clone() else {
                    self.strand(&intent, report);
                    return;
                };
                match self.status(&tx, report).await {
                    Some(TxStatus::Succeeded) => {
                        if let Err(e) = ledger.update_intent(intent.id, |i| i.phase = RedeemPhase::Complete) {
                            return self.ledger_error(&intent, e, report);
                        }
                        report.rewards_completed += 1;
                        metrics::record_reconcile_action("complete");
                        tracing::info!(intent_id = %intent.id, reward_tx = %tx, "Redeem completed");
                        return;
                    }
                    Some(TxStatus::Reverted(reason)) => {
                        match ledger.update_intent(intent.id, |i| {
                            i.phase = RedeemPhase::Failed {
                                stage: FailureStage::Reward,
                            };
                            i.last_error = Some(format!("reward reverted: {}", reason));
                        }) {
                            Ok(updated) => intent = updated,
                            Err(e) => return self.ledger_error(&intent, e, report),
                        }
                        report.rewards_failed += 1;
                        metrics::record_reconcile_action("fail_reward");
                    }
                    Some(TxStatus::Pending) => {
                        report.pending += 1;
                        return;
                    }
                    None => return,
                }
            }
            RedeemPhase::CompensationSubmitted => {
                let Some(tx) = intent.compensation_tx.clone() else {
                    self.strand(&intent, report);
                    return;
                };
                match self.status(&tx, report).await {
                    Some(TxStatus::Succeeded) => {
                        if let Err(e) = ledger.update_intent(intent.id, |i| i.phase = RedeemPhase::Compensated) {
                            return self.ledger_error(&intent, e, report);
                        }
                        report.compensated += 1;
                        metrics::record_reconcile_action("confirm_recredit");
                        tracing::warn!(intent_id = %intent.id, tx_hash = %tx, "Redeem compensated by re-credit");
                        return;
                    }
                    Some(TxStatus::Reverted(reason)) => {
                        match ledger.update_intent(intent.id, |i| {
                            i.phase = RedeemPhase::Failed {
                                stage: FailureStage::Reward,
                            };
                            i.last_error = Some(format!("re-credit reverted: {}", reason));
                        }) {
                            Ok(updated) => intent = updated,
                            Err(e) => return self.ledger_error(&intent, e, report),
                        }
                        metrics::record_reconcile_action("fail_recredit");
                    }
                    Some(TxStatus::Pending) => {
                        report.pending += 1;
                        return;
                    }
                    None => return,
                }
            }
            _ => {}
        }

        if intent.phase.owes_reward() {
            self.compensate(&intent, report).await;
        }
    }

    async fn compensate(&self, intent: &RedeemIntent, report: &mut SweepReport) {
        match self.config.compensation {
            CompensationStrategy::RetryReward => {
                if intent.reward_attempts >= self.config.max_reward_attempts {
                    tracing::error!(
                        intent_id = %intent.id,
                        attempts = intent.reward_attempts,
                        "Reward retries exhausted"
                    );
                    self.strand(intent, report);
                    return;
                }
                match self.orchestrator.retry_reward(intent).await {
                    Ok(tx) => {
                        report.rewards_retried += 1;
                        metrics::record_reconcile_action("retry_reward");
                        tracing::info!(intent_id = %intent.id, reward_tx = %tx, "Reward resubmitted");
                    }
                    Err(e) => {
                        report.errors += 1;
                        tracing::warn!(intent_id = %intent.id, error = %e, "Reward retry failed");
                    }
                }
            }
            CompensationStrategy::Recredit => match self.orchestrator.recredit(intent).await {
                Ok(_) => {
                    report.compensated += 1;
                    metrics::record_reconcile_action("recredit");
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(intent_id = %intent.id, error = %e, "Re-credit failed");
                }
            },
            CompensationStrategy::Manual => {
                tracing::error!(
                    intent_id = %intent.id,
                    user = %intent.user,
                    points = intent.points,
                    "Points debited without reward; manual action required"
                );
                self.strand(intent, report);
            }
        }
    }

    async fn status(&self, tx: &TxHash, report: &mut SweepReport) -> Option<TxStatus> {
        match self.orchestrator.chain().transaction_status(tx).await {
            Ok(status) => Some(status),
            Err(e) => {
                report.errors += 1;
                tracing::warn!(tx_hash = %tx, error = %e, "Status lookup failed");
                None
            }
        }
    }

    fn strand(&self, intent: &RedeemIntent, report: &mut SweepReport) {
        report.stranded.push(intent.id);
        metrics::record_reconcile_action("stranded");
    }

    fn ledger_error(&self, intent: &RedeemIntent, error: LedgerError, report: &mut SweepReport) {
        report.errors += 1;
        tracing::error!(intent_id = %intent.id, error = %error, "Failed to update redeem intent");
    }
}
