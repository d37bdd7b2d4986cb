//! Shared utilities for settlement integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use starknet::core::types::Felt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use enlivora_settlement::blockchain::calldata::entry_points;
use enlivora_settlement::blockchain::{ChainClient, ChainError, ChainResult, ContractCall, TxHash, TxStatus};
use enlivora_settlement::settlement::{ContractAddresses, SettlementLedger, SettlementOrchestrator};

pub const MERCHANT: u64 = 0xabc;
pub const PASSPORT: u64 = 0x111;
pub const LOYALTY: u64 = 0x222;
pub const REWARDS: u64 = 0x333;

/// Everything the orchestrator asked the chain to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted {
        entry_point: &'static str,
        tx: TxHash,
    },
    Confirmed {
        tx: TxHash,
    },
}

#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    submissions: Vec<(TxHash, ContractCall)>,
    next_tx: u64,
    owners: HashMap<u128, Felt>,
    product_hashes: HashMap<u128, Felt>,
    revoked: HashSet<u128>,
    balances: HashMap<Felt, u128>,
    reject: HashSet<&'static str>,
    revert: HashSet<&'static str>,
    stall: HashSet<&'static str>,
    hang: HashSet<&'static str>,
    status_overrides: HashMap<TxHash, TxStatus>,
}

impl MockState {
    fn entry_point_of(&self, tx: &TxHash) -> Option<&'static str> {
        self.submissions
            .iter()
            .find(|(hash, _)| hash == tx)
            .map(|(_, call)| call.entry_point)
    }

    fn apply(&mut self, call: &ContractCall) {
        let word = |i: usize| call.calldata.get(i).and_then(|f| u128::try_from(*f).ok()).unwrap_or_default();
        match call.entry_point {
            entry_points::MINT_PASSPORT => {
                let token = word(1);
                self.owners.insert(token, call.calldata[0]);
                self.product_hashes.insert(token, call.calldata[3]);
            }
            entry_points::TRANSFER_FROM => {
                self.owners.insert(word(2), call.calldata[1]);
            }
            entry_points::CREDIT_POINTS => {
                *self.balances.entry(call.calldata[0]).or_default() += word(1);
            }
            entry_points::DEBIT_POINTS => {
                let balance = self.balances.entry(call.calldata[0]).or_default();
                *balance = balance.saturating_sub(word(1));
            }
            _ => {}
        }
    }
}

/// In-memory chain that records every interaction and applies contract
/// effects on submission.
pub struct MockChain {
    signer: Option<Felt>,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            signer: Some(Felt::from(MERCHANT)),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn without_signer() -> Self {
        Self {
            signer: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Submissions to `entry_point` are refused by the node.
    pub fn reject(&self, entry_point: &'static str) {
        self.state.lock().unwrap().reject.insert(entry_point);
    }

    /// Transactions to `entry_point` are accepted but revert.
    pub fn revert(&self, entry_point: &'static str) {
        self.state.lock().unwrap().revert.insert(entry_point);
    }

    pub fn unrevert(&self, entry_point: &'static str) {
        self.state.lock().unwrap().revert.remove(entry_point);
    }

    /// Transactions to `entry_point` stay pending; waiting times out.
    pub fn stall(&self, entry_point: &'static str) {
        self.state.lock().unwrap().stall.insert(entry_point);
    }

    pub fn unstall(&self, entry_point: &'static str) {
        self.state.lock().unwrap().stall.remove(entry_point);
    }

    /// Submissions to `entry_point` never return.
    pub fn hang(&self, entry_point: &'static str) {
        self.state.lock().unwrap().hang.insert(entry_point);
    }

    pub fn unhang(&self, entry_point: &'static str) {
        self.state.lock().unwrap().hang.remove(entry_point);
    }

    pub fn set_status(&self, tx: &TxHash, status: TxStatus) {
        self.state.lock().unwrap().status_overrides.insert(tx.clone(), status);
    }

    pub fn revoke(&self, token_id: u128) {
        self.state.lock().unwrap().revoked.insert(token_id);
    }

    pub fn set_balance(&self, account: Felt, points: u128) {
        self.state.lock().unwrap().balances.insert(account, points);
    }

    pub fn balance(&self, account: Felt) -> u128 {
        self.state.lock().unwrap().balances.get(&account).copied().unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Calls submitted to `entry_point`, in order.
    pub fn submissions(&self, entry_point: &str) -> Vec<ContractCall> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|(_, call)| call.entry_point == entry_point)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    /// Position of an event in the log.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn submit(&self, call: ContractCall) -> ChainResult<TxHash> {
        let hang = self.state.lock().unwrap().hang.contains(call.entry_point);
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if self.signer.is_none() {
            return Err(ChainError::NotConfigured("no merchant account".to_string()));
        }
        if state.reject.contains(call.entry_point) {
            return Err(ChainError::Rejected(format!("{} refused", call.entry_point)));
        }

        state.next_tx += 1;
        let tx = TxHash::new(format!("0x{:x}", 0x1000 + state.next_tx));
        if !state.revert.contains(call.entry_point) {
            state.apply(&call);
        }
        state.events.push(Event::Submitted {
            entry_point: call.entry_point,
            tx: tx.clone(),
        });
        state.submissions.push((tx.clone(), call));
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx_hash: &TxHash) -> ChainResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry_point = state
            .entry_point_of(tx_hash)
            .ok_or_else(|| ChainError::Rpc(format!("unknown transaction {}", tx_hash)))?;

        if state.stall.contains(entry_point) {
            return Err(ChainError::ConfirmationTimeout {
                tx_hash: tx_hash.clone(),
                secs: 120,
            });
        }
        if state.revert.contains(entry_point) {
            return Err(ChainError::Reverted(format!("{} failed", entry_point)));
        }
        state.events.push(Event::Confirmed { tx: tx_hash.clone() });
        Ok(())
    }

    async fn transaction_status(&self, tx_hash: &TxHash) -> ChainResult<TxStatus> {
        let state = self.state.lock().unwrap();
        if let Some(status) = state.status_overrides.get(tx_hash) {
            return Ok(status.clone());
        }
        let entry_point = state
            .entry_point_of(tx_hash)
            .ok_or_else(|| ChainError::Rpc(format!("unknown transaction {}", tx_hash)))?;

        if state.stall.contains(entry_point) {
            Ok(TxStatus::Pending)
        } else if state.revert.contains(entry_point) {
            Ok(TxStatus::Reverted(format!("{} failed", entry_point)))
        } else {
            Ok(TxStatus::Succeeded)
        }
    }

    async fn call(&self, call: ContractCall) -> ChainResult<Vec<Felt>> {
        let state = self.state.lock().unwrap();
        let word = |i: usize| call.calldata.get(i).and_then(|f| u128::try_from(*f).ok()).unwrap_or_default();
        match call.entry_point {
            entry_points::OWNER_OF => state
                .owners
                .get(&word(0))
                .map(|owner| vec![*owner])
                .ok_or_else(|| ChainError::Rpc("ERC721: invalid token ID".to_string())),
            entry_points::GET_PASSPORT_DATA => {
                let token = word(0);
                let hash = state
                    .product_hashes
                    .get(&token)
                    .copied()
                    .ok_or_else(|| ChainError::Rpc("ERC721: invalid token ID".to_string()))?;
                let revoked = if state.revoked.contains(&token) { Felt::ONE } else { Felt::ZERO };
                Ok(vec![hash, revoked])
            }
            entry_points::BALANCE_OF => {
                let balance = state.balances.get(&call.calldata[0]).copied().unwrap_or_default();
                Ok(vec![Felt::from(balance), Felt::ZERO])
            }
            other => Err(ChainError::Rpc(format!("unexpected read {}", other))),
        }
    }

    fn signer_address(&self) -> Option<Felt> {
        self.signer
    }
}

pub fn all_contracts() -> ContractAddresses {
    ContractAddresses {
        passport: Some(Felt::from(PASSPORT)),
        loyalty: Some(Felt::from(LOYALTY)),
        rewards: Some(Felt::from(REWARDS)),
    }
}

/// Orchestrator over a fresh mock chain and an in-memory ledger.
pub fn setup() -> (Arc<MockChain>, SettlementOrchestrator<MockChain>) {
    let chain = Arc::new(MockChain::new());
    let orchestrator = SettlementOrchestrator::new(
        Arc::clone(&chain),
        all_contracts(),
        Arc::new(SettlementLedger::new(None)),
    );
    (chain, orchestrator)
}
