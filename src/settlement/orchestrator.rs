//! Sequences contract calls for mint, transfer, credit, redeem and reads.

use starknet::core::types::Felt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::blockchain::calldata::{self, parse_address, parse_felt_hex, TokenId};
use crate::blockchain::chain::ChainClient;
use crate::blockchain::types::{ChainError, ContractCall, TxHash, TxStatus};
use crate::config::ContractsConfig;
use crate::observability::metrics;
use crate::settlement::ledger::{Reservation, SettlementLedger};
use crate::settlement::redeem::{FailureStage, RedeemIntent, RedeemPhase};
use crate::settlement::types::{
    Operation, PassportStatus, RedeemReceipt, RedeemRequest, SettlementError, SettlementResult, WaitPolicy,
};

/// Parsed contract addresses. `None` means not configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractAddresses {
    pub passport: Option<Felt>,
    pub loyalty: Option<Felt>,
    pub rewards: Option<Felt>,
}

impl ContractAddresses {
    pub fn from_config(config: &ContractsConfig) -> SettlementResult<Self> {
        fn parse(name: &str, value: &Option<String>) -> SettlementResult<Option<Felt>> {
            value
                .as_deref()
                .map(|v| parse_address(v).map_err(|e| SettlementError::Config(format!("{} address: {}", name, e))))
                .transpose()
        }

        Ok(Self {
            passport: parse("passport", &config.passport)?,
            loyalty: parse("loyalty", &config.loyalty)?,
            rewards: parse("rewards", &config.rewards)?,
        })
    }
}

/// Settlement core. Holds no mutable state of its own beyond the ledger.
pub struct SettlementOrchestrator<C: ChainClient> {
    chain: Arc<C>,
    contracts: ContractAddresses,
    ledger: Arc<SettlementLedger>,
}

impl<C: ChainClient> SettlementOrchestrator<C> {
    pub fn new(chain: Arc<C>, contracts: ContractAddresses, ledger: Arc<SettlementLedger>) -> Self {
        Self {
            chain,
            contracts,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<SettlementLedger> {
        &self.ledger
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Mint a passport to the merchant account.
    ///
    /// Not deduplicated: calling twice with the same token ID submits twice.
    pub async fn mint(&self, token_id: &str, product_hash: &str, wait: WaitPolicy) -> SettlementResult<TxHash> {
        let token = parse_token_id(token_id)?;
        let product_hash = parse_felt_hex(product_hash).map_err(|e| SettlementError::invalid("product_hash", e))?;
        let passport = self.passport_contract()?;
        let merchant = self.merchant()?;

        tracing::info!(token_id = %token, recipient = %format!("{:#x}", merchant), "Minting passport");
        let tx = self
            .execute(
                Operation::Mint,
                calldata::mint_passport(passport, merchant, token, product_hash),
                wait,
            )
            .await?;
        tracing::info!(token_id = %token, tx_hash = %tx, "Passport mint submitted");
        Ok(tx)
    }

    /// Transfer a passport from the merchant account. Ownership is not pre-checked.
    pub async fn transfer(&self, token_id: &str, to: &str, wait: WaitPolicy) -> SettlementResult<TxHash> {
        let token = parse_token_id(token_id)?;
        let to = parse_address(to).map_err(|e| SettlementError::invalid("to_address", e))?;
        let passport = self.passport_contract()?;
        let merchant = self.merchant()?;

        tracing::info!(token_id = %token, to = %format!("{:#x}", to), "Transferring passport");
        let tx = self
            .execute(
                Operation::Transfer,
                calldata::transfer_from(passport, merchant, to, token),
                wait,
            )
            .await?;
        tracing::info!(token_id = %token, tx_hash = %tx, "Passport transfer submitted");
        Ok(tx)
    }

    /// Credit loyalty points for an order, at most once per order reference.
    pub async fn credit(
        &self,
        user: &str,
        amount: u128,
        order_reference: &str,
        wait: WaitPolicy,
    ) -> SettlementResult<TxHash> {
        let recipient = parse_address(user).map_err(|e| SettlementError::invalid("user_address", e))?;
        let order_reference = order_reference.trim();
        if order_reference.is_empty() {
            return Err(SettlementError::InvalidInput {
                field: "order_reference",
                reason: "value is empty".to_string(),
            });
        }
        ensure_positive("amount", amount)?;
        let loyalty = self.loyalty_contract()?;
        self.merchant()?;

        self.ledger.refresh()?;
        let mut reservation = self.ledger.reserve(Operation::Credit, order_reference);
        if let Reservation::Completed(earlier) = reservation.clone() {
            // an earlier credit that reverted after being recorded never applied
            match self.chain.transaction_status(&earlier).await.map_err(SettlementError::Read)? {
                TxStatus::Reverted(reason) => {
                    tracing::warn!(
                        order_reference,
                        tx_hash = %earlier,
                        reason = %reason,
                        "Earlier credit reverted, resubmitting"
                    );
                    self.ledger.forget(Operation::Credit, order_reference, &earlier)?;
                    reservation = self.ledger.reserve(Operation::Credit, order_reference);
                }
                TxStatus::Succeeded | TxStatus::Pending => {}
            }
        }
        match reservation {
            Reservation::Completed(tx) => {
                tracing::info!(order_reference, tx_hash = %tx, "Credit already settled for order");
                return Ok(tx);
            }
            Reservation::InFlight => {
                return Err(SettlementError::DuplicateInFlight {
                    operation: Operation::Credit,
                    reference: order_reference.to_string(),
                });
            }
            Reservation::Fresh => {}
        }
        let guard = self.ledger.guard(Operation::Credit, order_reference);

        tracing::info!(user, amount, order_reference, "Crediting loyalty points");
        let tx = self
            .submit(Operation::Credit, calldata::credit_points(loyalty, recipient, amount))
            .await?;

        if let Err(e) = self.ledger.complete(Operation::Credit, order_reference, tx.clone()) {
            tracing::error!(order_reference, tx_hash = %tx, error = %e, "Failed to persist credit ledger entry");
        }
        guard.disarm();
        tracing::info!(order_reference, tx_hash = %tx, "Credit submitted");

        if wait == WaitPolicy::Confirmed {
            if let Err(e) = self.confirm(Operation::Credit, &tx).await {
                if is_reverted(&e) {
                    // reverted credits never applied; let the order be retried
                    if let Err(le) = self.ledger.forget(Operation::Credit, order_reference, &tx) {
                        tracing::error!(order_reference, error = %le, "Failed to drop reverted credit entry");
                    }
                }
                return Err(e);
            }
        }
        Ok(tx)
    }

    /// Debit points, then pay the reward once the debit is confirmed.
    pub async fn redeem(&self, request: RedeemRequest) -> SettlementResult<RedeemReceipt> {
        let user = parse_address(&request.user).map_err(|e| SettlementError::invalid("user_address", e))?;
        let reward_token =
            parse_address(&request.reward_token).map_err(|e| SettlementError::invalid("reward_token", e))?;
        ensure_positive("points", request.points)?;
        ensure_positive("reward_amount", request.reward_amount)?;
        let loyalty = self.loyalty_contract()?;
        let rewards = self.rewards_contract()?;
        self.merchant()?;

        let intent = self.ledger.open_intent(RedeemIntent::new(
            format!("{:#x}", user),
            request.points,
            format!("{:#x}", reward_token),
            request.reward_amount,
        ))?;
        let intent_id = intent.id;
        tracing::info!(
            intent_id = %intent_id,
            user = %intent.user,
            points = request.points,
            reward_amount = request.reward_amount,
            "Redeem started"
        );

        // Phase 1: debit, always confirmed before anything else is sent.
        let debit_tx = match self
            .submit(Operation::Debit, calldata::debit_points(loyalty, user, request.points))
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.record(intent_id, |i| {
                    i.phase = RedeemPhase::Failed {
                        stage: FailureStage::Debit,
                    };
                    i.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };
        self.record(intent_id, |i| {
            i.phase = RedeemPhase::DebitSubmitted;
            i.debit_tx = Some(debit_tx.clone());
        });

        if let Err(e) = self.confirm(Operation::Debit, &debit_tx).await {
            let reverted = is_reverted(&e);
            self.record(intent_id, |i| {
                // a timed-out debit may still land; leave it for the reconciler
                if reverted {
                    i.phase = RedeemPhase::Failed {
                        stage: FailureStage::Debit,
                    };
                }
                i.last_error = Some(e.to_string());
            });
            return Err(e);
        }
        self.record(intent_id, |i| i.phase = RedeemPhase::DebitConfirmed);

        // Phase 2: reward payout.
        let reward_tx = match self.submit_reward_for(intent_id, rewards, reward_token, user, request.reward_amount).await {
            Ok(tx) => tx,
            Err(e) => return Err(self.partial_failure(intent_id, &intent.user, debit_tx, e)),
        };

        let mut phase = RedeemPhase::RewardSubmitted;
        if request.reward_wait == WaitPolicy::Confirmed {
            if let Err(e) = self.confirm(Operation::Reward, &reward_tx).await {
                let reverted = is_reverted(&e);
                self.record(intent_id, |i| {
                    if reverted {
                        i.phase = RedeemPhase::Failed {
                            stage: FailureStage::Reward,
                        };
                    }
                    i.last_error = Some(e.to_string());
                });
                return Err(self.partial_failure(intent_id, &intent.user, debit_tx, e));
            }
            self.record(intent_id, |i| i.phase = RedeemPhase::Complete);
            phase = RedeemPhase::Complete;
        }

        tracing::info!(
            intent_id = %intent_id,
            debit_tx = %debit_tx,
            reward_tx = %reward_tx,
            phase = %phase,
            "Redeem settled"
        );
        Ok(RedeemReceipt {
            intent_id,
            debit_tx,
            reward_tx,
            phase,
        })
    }

    /// Owner and revocation status of a passport; `None` on any failure.
    pub async fn read_passport(&self, token_id: &str) -> Option<PassportStatus> {
        match self.try_read_passport(token_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(token_id, error = %e, "Passport read failed");
                None
            }
        }
    }

    async fn try_read_passport(&self, token_id: &str) -> SettlementResult<PassportStatus> {
        let token = parse_token_id(token_id)?;
        let passport = self.passport_contract()?;

        let owner = self
            .chain
            .call(calldata::owner_of(passport, token))
            .await
            .map_err(SettlementError::Read)?;
        let data = self
            .chain
            .call(calldata::get_passport_data(passport, token))
            .await
            .map_err(SettlementError::Read)?;

        let owner = owner
            .first()
            .ok_or_else(|| SettlementError::Read(ChainError::Decode("owner_of returned nothing".to_string())))?;
        let (product_hash, revoked) = match data.as_slice() {
            [hash, revoked, ..] => (hash, revoked),
            _ => {
                return Err(SettlementError::Read(ChainError::Decode(format!(
                    "get_passport_data returned {} values",
                    data.len()
                ))))
            }
        };

        Ok(PassportStatus {
            token_id: token.to_string(),
            owner: format!("{:#x}", owner),
            is_revoked: *revoked != Felt::ZERO,
            product_hash: format!("{:#x}", product_hash),
        })
    }

    /// Loyalty point balance of an account.
    pub async fn balance_of(&self, user: &str) -> SettlementResult<u128> {
        let account = parse_address(user).map_err(|e| SettlementError::invalid("user_address", e))?;
        let loyalty = self.loyalty_contract()?;

        let result = self
            .chain
            .call(calldata::balance_of(loyalty, account))
            .await
            .map_err(SettlementError::Read)?;
        match result.as_slice() {
            [low, high, ..] => calldata::decode_u256(low, high).ok_or_else(|| {
                SettlementError::Read(ChainError::Decode("balance exceeds 128 bits".to_string()))
            }),
            _ => Err(SettlementError::Read(ChainError::Decode(format!(
                "balance_of returned {} values",
                result.len()
            )))),
        }
    }

    /// Submit (or resubmit) the reward for an intent that owes one.
    pub(crate) async fn retry_reward(&self, intent: &RedeemIntent) -> SettlementResult<TxHash> {
        let rewards = self.rewards_contract()?;
        let user = parse_address(&intent.user).map_err(|e| SettlementError::invalid("user_address", e))?;
        let token =
            parse_address(&intent.reward_token).map_err(|e| SettlementError::invalid("reward_token", e))?;
        self.submit_reward_for(intent.id, rewards, token, user, intent.reward_amount)
            .await
    }

    /// Credit the debited points back and mark the intent compensated.
    ///
    /// The credit is recorded on the intent before waiting, so a credit that
    /// times out is resolved by status lookup rather than sent again.
    pub(crate) async fn recredit(&self, intent: &RedeemIntent) -> SettlementResult<TxHash> {
        let loyalty = self.loyalty_contract()?;
        let user = parse_address(&intent.user).map_err(|e| SettlementError::invalid("user_address", e))?;

        let tx = self
            .submit(Operation::Credit, calldata::credit_points(loyalty, user, intent.points))
            .await?;
        self.record(intent.id, |i| {
            i.phase = RedeemPhase::CompensationSubmitted;
            i.compensation_tx = Some(tx.clone());
            i.last_error = None;
        });

        if let Err(e) = self.confirm(Operation::Credit, &tx).await {
            let reverted = is_reverted(&e);
            self.record(intent.id, |i| {
                if reverted {
                    i.phase = RedeemPhase::Failed {
                        stage: FailureStage::Reward,
                    };
                }
                i.last_error = Some(e.to_string());
            });
            return Err(e);
        }
        self.ledger
            .update_intent(intent.id, |i| i.phase = RedeemPhase::Compensated)?;
        tracing::warn!(intent_id = %intent.id, tx_hash = %tx, points = intent.points, "Redeem compensated by re-credit");
        Ok(tx)
    }

    async fn submit_reward_for(
        &self,
        intent_id: Uuid,
        rewards: Felt,
        token: Felt,
        recipient: Felt,
        amount: u128,
    ) -> SettlementResult<TxHash> {
        let result = self
            .submit(
                Operation::Reward,
                calldata::redeem_rewards(rewards, token, recipient, amount),
            )
            .await;

        match &result {
            Ok(tx) => self.record(intent_id, |i| {
                i.phase = RedeemPhase::RewardSubmitted;
                i.reward_tx = Some(tx.clone());
                i.reward_attempts += 1;
                i.last_error = None;
            }),
            Err(e) => self.record(intent_id, |i| {
                i.phase = RedeemPhase::Failed {
                    stage: FailureStage::Reward,
                };
                i.reward_attempts += 1;
                i.last_error = Some(e.to_string());
            }),
        }
        result
    }

    fn partial_failure(&self, intent_id: Uuid, user: &str, debit_tx: TxHash, source: SettlementError) -> SettlementError {
        tracing::error!(
            intent_id = %intent_id,
            user,
            debit_tx = %debit_tx,
            error = %source,
            "Redeem partially failed: points debited but reward not paid"
        );
        metrics::record_partial_redeem();
        SettlementError::PartialRedeem {
            intent_id,
            debit_tx,
            source: Box::new(source),
        }
    }

    /// Persist an intent update after a submission already happened.
    ///
    /// The chain outcome stands regardless, so ledger failures are logged
    /// rather than returned.
    fn record<F>(&self, intent_id: Uuid, update: F)
    where
        F: FnOnce(&mut RedeemIntent),
    {
        if let Err(e) = self.ledger.update_intent(intent_id, update) {
            tracing::error!(intent_id = %intent_id, error = %e, "Failed to record redeem intent update");
        }
    }

    async fn execute(&self, operation: Operation, call: ContractCall, wait: WaitPolicy) -> SettlementResult<TxHash> {
        let tx = self.submit(operation, call).await?;
        if wait == WaitPolicy::Confirmed {
            self.confirm(operation, &tx).await?;
        }
        Ok(tx)
    }

    async fn submit(&self, operation: Operation, call: ContractCall) -> SettlementResult<TxHash> {
        match self.chain.submit(call).await {
            Ok(tx) => {
                metrics::record_submitted(operation.as_str());
                tracing::debug!(operation = %operation, tx_hash = %tx, "Transaction submitted");
                Ok(tx)
            }
            Err(source) => {
                let err = SettlementError::Submission { operation, source };
                metrics::record_failure(operation.as_str(), err.stage());
                tracing::warn!(operation = %operation, error = %err, "Transaction submission failed");
                Err(err)
            }
        }
    }

    async fn confirm(&self, operation: Operation, tx_hash: &TxHash) -> SettlementResult<()> {
        let started = Instant::now();
        let result = self.chain.wait_for_confirmation(tx_hash).await;
        metrics::record_confirmation(operation.as_str(), started);

        result.map_err(|source| {
            let err = SettlementError::Confirmation {
                operation,
                tx_hash: tx_hash.clone(),
                source,
            };
            metrics::record_failure(operation.as_str(), err.stage());
            tracing::warn!(operation = %operation, tx_hash = %tx_hash, error = %err, "Transaction not confirmed");
            err
        })
    }

    fn merchant(&self) -> SettlementResult<Felt> {
        self.chain
            .signer_address()
            .ok_or_else(|| SettlementError::Config("merchant account credentials are not configured".to_string()))
    }

    fn passport_contract(&self) -> SettlementResult<Felt> {
        self.contracts
            .passport
            .ok_or_else(|| SettlementError::Config("passport contract address is not configured".to_string()))
    }

    fn loyalty_contract(&self) -> SettlementResult<Felt> {
        self.contracts
            .loyalty
            .ok_or_else(|| SettlementError::Config("loyalty contract address is not configured".to_string()))
    }

    fn rewards_contract(&self) -> SettlementResult<Felt> {
        self.contracts
            .rewards
            .ok_or_else(|| SettlementError::Config("rewards contract address is not configured".to_string()))
    }
}

fn parse_token_id(token_id: &str) -> SettlementResult<TokenId> {
    TokenId::from_str(token_id).map_err(|e| SettlementError::invalid("token_id", e))
}

fn is_reverted(err: &SettlementError) -> bool {
    matches!(
        err,
        SettlementError::Confirmation {
            source: ChainError::Reverted(_),
            ..
        }
    )
}

fn ensure_positive(field: &'static str, value: u128) -> SettlementResult<()> {
    if value == 0 {
        return Err(SettlementError::InvalidInput {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
