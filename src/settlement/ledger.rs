//! Idempotency entries and redeem intents, with JSON snapshot persistence.
//!
//! Several processes may share one snapshot file (the daemon and the
//! operator CLI). Every write happens under an exclusive lock on a sidecar
//! `.lock` file and first merges what is already on disk, so changes made by
//! another process are kept. Only the keys this process touched since its
//! last successful write override the file.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::types::TxHash;
use crate::config::LedgerConfig;
use crate::observability::metrics;
use crate::settlement::redeem::{unix_now, RedeemIntent, RedeemPhase};
use crate::settlement::types::Operation;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Unknown redeem intent {0}")]
    UnknownIntent(Uuid),

    #[error("Invalid phase transition for intent {id}: {from} -> {to}")]
    InvalidTransition { id: Uuid, from: RedeemPhase, to: RedeemPhase },
}

/// A settled operation, keyed by its external reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub operation: Operation,
    pub reference: String,
    pub tx_hash: TxHash,
    pub recorded_at: u64,
}

/// Outcome of claiming an (operation, reference) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Caller owns the slot and must `complete` or `release` it.
    Fresh,
    /// Already settled by an earlier call.
    Completed(TxHash),
    /// Another caller holds the slot right now.
    InFlight,
}

#[derive(Debug, Clone)]
enum Slot {
    InFlight,
    Done(LedgerEntry),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
    #[serde(default)]
    intents: Vec<RedeemIntent>,
}

/// Keys changed in memory that the snapshot file does not reflect yet.
#[derive(Debug, Default)]
struct Unsynced {
    entries: HashSet<String>,
    intents: HashSet<Uuid>,
}

/// Counts exposed through the admin API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub completed_entries: usize,
    pub in_flight: usize,
    pub intents_total: usize,
    pub open_intents: usize,
    pub intents_by_phase: BTreeMap<String, usize>,
}

/// Thread-safe ledger shared by the orchestrator, reconciler and admin API.
///
/// Every mutation rewrites the snapshot (temp file, then rename) when a path
/// is configured. In-flight reservations live only in memory.
#[derive(Debug, Default)]
pub struct SettlementLedger {
    entries: DashMap<String, Slot>,
    intents: DashMap<Uuid, RedeemIntent>,
    persistence_path: Option<PathBuf>,
    /// Held for the whole of every mutation, including the file write.
    unsynced: Mutex<Unsynced>,
}

fn key(operation: Operation, reference: &str) -> String {
    format!("{}:{}", operation.as_str(), reference)
}

impl SettlementLedger {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            persistence_path,
            ..Self::default()
        }
    }

    /// Open the ledger described by config, loading its snapshot if present.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        match &config.path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::new(None)),
        }
    }

    /// Load from file if it exists; the file becomes the persistence target.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let ledger = Self::new(Some(path.to_path_buf()));
        ledger.refresh()?;
        if !ledger.entries.is_empty() || !ledger.intents.is_empty() {
            tracing::info!(
                path = %path.display(),
                entries = ledger.entries.len(),
                intents = ledger.intents.len(),
                "Loaded settlement ledger"
            );
        }
        Ok(ledger)
    }

    /// Pull in changes other processes wrote to the snapshot file.
    pub fn refresh(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let unsynced = self.lock();
        let lock = lock_file(path)?;
        lock.lock_shared()?;
        let snapshot = read_snapshot(path)?;
        self.merge(snapshot, &unsynced);
        metrics::record_open_intents(self.open_intent_count());
        Ok(())
    }

    /// Claim the slot for (operation, reference).
    pub fn reserve(&self, operation: Operation, reference: &str) -> Reservation {
        match self.entries.entry(key(operation, reference)) {
            Entry::Occupied(slot) => match slot.get() {
                Slot::Done(entry) => Reservation::Completed(entry.tx_hash.clone()),
                Slot::InFlight => Reservation::InFlight,
            },
            Entry::Vacant(slot) => {
                slot.insert(Slot::InFlight);
                Reservation::Fresh
            }
        }
    }

    /// Release guard for a `Fresh` reservation. Dropping it before
    /// [`ReservationGuard::disarm`] frees the slot, so a cancelled caller
    /// does not block the reference until restart.
    pub fn guard<'a>(&'a self, operation: Operation, reference: &'a str) -> ReservationGuard<'a> {
        ReservationGuard {
            ledger: self,
            operation,
            reference,
            armed: true,
        }
    }

    /// Record the submitted transaction for a reserved slot.
    ///
    /// The in-memory entry is updated even if persisting fails.
    pub fn complete(&self, operation: Operation, reference: &str, tx_hash: TxHash) -> Result<(), LedgerError> {
        let mut unsynced = self.lock();
        let key = key(operation, reference);
        let entry = LedgerEntry {
            operation,
            reference: reference.to_string(),
            tx_hash,
            recorded_at: unix_now(),
        };
        self.entries.insert(key.clone(), Slot::Done(entry));
        unsynced.entries.insert(key);
        self.sync(&mut unsynced)
    }

    /// Drop an in-flight reservation so the reference can be retried.
    pub fn release(&self, operation: Operation, reference: &str) {
        self.entries
            .remove_if(&key(operation, reference), |_, slot| matches!(slot, Slot::InFlight));
    }

    /// Remove the entry recorded for `tx_hash`, whose transaction is known
    /// not to have applied. An entry for any other transaction is kept.
    pub fn forget(&self, operation: Operation, reference: &str, tx_hash: &TxHash) -> Result<(), LedgerError> {
        let mut unsynced = self.lock();
        let key = key(operation, reference);
        let removed = self
            .entries
            .remove_if(&key, |_, slot| matches!(slot, Slot::Done(entry) if &entry.tx_hash == tx_hash))
            .is_some();
        if removed {
            unsynced.entries.insert(key);
            self.sync(&mut unsynced)?;
        }
        Ok(())
    }

    pub fn entry(&self, operation: Operation, reference: &str) -> Option<LedgerEntry> {
        self.entries
            .get(&key(operation, reference))
            .and_then(|slot| match slot.value() {
                Slot::Done(entry) => Some(entry.clone()),
                Slot::InFlight => None,
            })
    }

    /// Store a new intent and persist it before returning.
    pub fn open_intent(&self, intent: RedeemIntent) -> Result<RedeemIntent, LedgerError> {
        let mut unsynced = self.lock();
        self.intents.insert(intent.id, intent.clone());
        unsynced.intents.insert(intent.id);
        if let Err(e) = self.sync(&mut unsynced) {
            self.intents.remove(&intent.id);
            unsynced.intents.remove(&intent.id);
            return Err(e);
        }
        metrics::record_open_intents(self.open_intent_count());
        Ok(intent)
    }

    /// Apply `update` to an intent, rejecting phase changes the state machine forbids.
    pub fn update_intent<F>(&self, id: Uuid, update: F) -> Result<RedeemIntent, LedgerError>
    where
        F: FnOnce(&mut RedeemIntent),
    {
        let mut unsynced = self.lock();
        let updated = {
            let mut current = self.intents.get_mut(&id).ok_or(LedgerError::UnknownIntent(id))?;
            let mut next = current.clone();
            update(&mut next);

            if next.phase != current.phase && !current.phase.can_transition_to(next.phase) {
                return Err(LedgerError::InvalidTransition {
                    id,
                    from: current.phase,
                    to: next.phase,
                });
            }
            next.updated_at = unix_now();
            *current = next.clone();
            next
        };
        unsynced.intents.insert(id);

        metrics::record_open_intents(self.open_intent_count());
        self.sync(&mut unsynced)?;
        Ok(updated)
    }

    pub fn intent(&self, id: Uuid) -> Option<RedeemIntent> {
        self.intents.get(&id).map(|r| r.value().clone())
    }

    /// All intents, oldest first.
    pub fn intents(&self) -> Vec<RedeemIntent> {
        let mut intents: Vec<_> = self.intents.iter().map(|r| r.value().clone()).collect();
        intents.sort_by_key(|i| (i.created_at, i.id));
        intents
    }

    /// Intents the reconciler still has work for, oldest first.
    pub fn open_intents(&self) -> Vec<RedeemIntent> {
        let mut intents = self.intents();
        intents.retain(|i| !i.phase.is_terminal());
        intents
    }

    fn open_intent_count(&self) -> usize {
        self.intents.iter().filter(|r| !r.value().phase.is_terminal()).count()
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for slot in self.entries.iter() {
            match slot.value() {
                Slot::Done(_) => summary.completed_entries += 1,
                Slot::InFlight => summary.in_flight += 1,
            }
        }
        for intent in self.intents.iter() {
            summary.intents_total += 1;
            if !intent.phase.is_terminal() {
                summary.open_intents += 1;
            }
            *summary
                .intents_by_phase
                .entry(intent.phase.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    fn lock(&self) -> MutexGuard<'_, Unsynced> {
        self.unsynced.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fold a snapshot read from disk into memory. Keys in `unsynced` keep
    /// their in-memory state; in-flight slots are never overwritten.
    fn merge(&self, snapshot: Snapshot, unsynced: &Unsynced) {
        let mut on_disk = HashSet::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            let key = key(entry.operation, &entry.reference);
            on_disk.insert(key.clone());
            if unsynced.entries.contains(&key) {
                continue;
            }
            match self.entries.entry(key) {
                Entry::Occupied(mut slot) => {
                    if matches!(slot.get(), Slot::Done(_)) {
                        slot.insert(Slot::Done(entry));
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Slot::Done(entry));
                }
            }
        }
        // forgotten by another process
        self.entries.retain(|key, slot| match slot {
            Slot::InFlight => true,
            Slot::Done(_) => on_disk.contains(key) || unsynced.entries.contains(key),
        });

        for intent in snapshot.intents {
            if !unsynced.intents.contains(&intent.id) {
                self.intents.insert(intent.id, intent);
            }
        }
    }

    fn sync(&self, unsynced: &mut Unsynced) -> Result<(), LedgerError> {
        let Some(path) = &self.persistence_path else {
            unsynced.entries.clear();
            unsynced.intents.clear();
            return Ok(());
        };
        let lock = lock_file(path)?;
        lock.lock_exclusive()?;
        self.merge(read_snapshot(path)?, unsynced);

        let snapshot = Snapshot {
            entries: self
                .entries
                .iter()
                .filter_map(|slot| match slot.value() {
                    Slot::Done(entry) => Some(entry.clone()),
                    Slot::InFlight => None,
                })
                .collect(),
            intents: self.intents(),
        };

        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        unsynced.entries.clear();
        unsynced.intents.clear();
        tracing::debug!(
            entries = snapshot.entries.len(),
            intents = snapshot.intents.len(),
            "Persisted settlement ledger"
        );
        Ok(())
    }
}

/// Releases a reservation on drop unless disarmed.
#[must_use = "dropping the guard releases the reservation"]
pub struct ReservationGuard<'a> {
    ledger: &'a SettlementLedger,
    operation: Operation,
    reference: &'a str,
    armed: bool,
}

impl ReservationGuard<'_> {
    /// Keep the slot; it has been completed.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.release(self.operation, self.reference);
        }
    }
}

fn lock_file(path: &Path) -> Result<File, LedgerError> {
    Ok(OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path.with_extension("lock"))?)
}

fn read_snapshot(path: &Path) -> Result<Snapshot, LedgerError> {
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::redeem::FailureStage;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("ledger-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn test_reserve_complete_release() {
        let ledger = SettlementLedger::new(None);

        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::Fresh);
        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::InFlight);

        ledger.release(Operation::Credit, "order-1");
        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::Fresh);

        ledger.complete(Operation::Credit, "order-1", TxHash::new("0xabc")).unwrap();
        assert_eq!(
            ledger.reserve(Operation::Credit, "order-1"),
            Reservation::Completed(TxHash::new("0xabc"))
        );

        // release never drops a completed entry
        ledger.release(Operation::Credit, "order-1");
        assert!(ledger.entry(Operation::Credit, "order-1").is_some());
    }

    #[test]
    fn test_operations_are_namespaced() {
        let ledger = SettlementLedger::new(None);
        assert_eq!(ledger.reserve(Operation::Credit, "ref"), Reservation::Fresh);
        assert_eq!(ledger.reserve(Operation::Mint, "ref"), Reservation::Fresh);
    }

    #[test]
    fn test_update_intent_rejects_invalid_transition() {
        let ledger = SettlementLedger::new(None);
        let intent = ledger.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();

        let err = ledger
            .update_intent(intent.id, |i| i.phase = RedeemPhase::RewardSubmitted)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(ledger.intent(intent.id).unwrap().phase, RedeemPhase::Idle);

        let updated = ledger
            .update_intent(intent.id, |i| {
                i.phase = RedeemPhase::DebitSubmitted;
                i.debit_tx = Some(TxHash::new("0xd"));
            })
            .unwrap();
        assert_eq!(updated.phase, RedeemPhase::DebitSubmitted);
    }

    #[test]
    fn test_update_unknown_intent() {
        let ledger = SettlementLedger::new(None);
        let err = ledger.update_intent(Uuid::new_v4(), |_| {}).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownIntent(_)));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = temp_path();

        let ledger = SettlementLedger::new(Some(path.clone()));
        ledger.complete(Operation::Credit, "order-7", TxHash::new("0x7")).unwrap();
        assert_eq!(ledger.reserve(Operation::Credit, "order-8"), Reservation::Fresh);
        let intent = ledger.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();
        ledger
            .update_intent(intent.id, |i| {
                i.phase = RedeemPhase::Failed {
                    stage: FailureStage::Debit,
                };
                i.last_error = Some("rejected".to_string());
            })
            .unwrap();

        let loaded = SettlementLedger::load_from_file(&path).unwrap();
        assert_eq!(
            loaded.reserve(Operation::Credit, "order-7"),
            Reservation::Completed(TxHash::new("0x7"))
        );
        // in-flight reservations are not persisted
        assert_eq!(loaded.reserve(Operation::Credit, "order-8"), Reservation::Fresh);

        let restored = loaded.intent(intent.id).unwrap();
        assert_eq!(restored.last_error.as_deref(), Some("rejected"));
        assert!(restored.phase.is_terminal());

        std::fs::remove_file(&path).unwrap_or_default();
        std::fs::remove_file(path.with_extension("lock")).unwrap_or_default();
    }

    #[test]
    fn test_forget_only_drops_matching_transaction() {
        let ledger = SettlementLedger::new(None);
        ledger.complete(Operation::Credit, "order-1", TxHash::new("0x2")).unwrap();

        ledger.forget(Operation::Credit, "order-1", &TxHash::new("0x1")).unwrap();
        assert!(ledger.entry(Operation::Credit, "order-1").is_some());

        ledger.forget(Operation::Credit, "order-1", &TxHash::new("0x2")).unwrap();
        assert!(ledger.entry(Operation::Credit, "order-1").is_none());
    }

    #[test]
    fn test_dropped_guard_releases_reservation() {
        let ledger = SettlementLedger::new(None);
        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::Fresh);
        drop(ledger.guard(Operation::Credit, "order-1"));
        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::Fresh);

        let guard = ledger.guard(Operation::Credit, "order-1");
        ledger.complete(Operation::Credit, "order-1", TxHash::new("0x1")).unwrap();
        guard.disarm();
        assert_eq!(
            ledger.reserve(Operation::Credit, "order-1"),
            Reservation::Completed(TxHash::new("0x1"))
        );
    }

    #[test]
    fn test_disarmed_guard_keeps_in_flight_slot() {
        let ledger = SettlementLedger::new(None);
        ledger.reserve(Operation::Credit, "order-1");
        ledger.guard(Operation::Credit, "order-1").disarm();
        assert_eq!(ledger.reserve(Operation::Credit, "order-1"), Reservation::InFlight);
    }

    #[test]
    fn test_processes_sharing_a_file_keep_each_others_intents() {
        let path = temp_path();
        let daemon = SettlementLedger::load_from_file(&path).unwrap();
        let cli = SettlementLedger::load_from_file(&path).unwrap();

        let a = cli.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();
        let b = daemon.open_intent(RedeemIntent::new("0x3", 20, "0x2", 5)).unwrap();
        // the daemon picked up the CLI's intent while writing its own
        assert!(daemon.intent(a.id).is_some());

        cli.update_intent(a.id, |i| i.phase = RedeemPhase::DebitSubmitted).unwrap();
        daemon.update_intent(b.id, |i| i.phase = RedeemPhase::DebitSubmitted).unwrap();

        let reloaded = SettlementLedger::load_from_file(&path).unwrap();
        assert_eq!(reloaded.intents().len(), 2);
        assert_eq!(reloaded.intent(a.id).unwrap().phase, RedeemPhase::DebitSubmitted);
        assert_eq!(reloaded.intent(b.id).unwrap().phase, RedeemPhase::DebitSubmitted);

        std::fs::remove_file(&path).unwrap_or_default();
        std::fs::remove_file(path.with_extension("lock")).unwrap_or_default();
    }

    #[test]
    fn test_refresh_sees_other_process_changes() {
        let path = temp_path();
        let daemon = SettlementLedger::load_from_file(&path).unwrap();
        let cli = SettlementLedger::load_from_file(&path).unwrap();

        cli.complete(Operation::Credit, "order-1", TxHash::new("0x1")).unwrap();
        let intent = cli.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();
        assert!(daemon.intent(intent.id).is_none());

        daemon.refresh().unwrap();
        assert!(daemon.intent(intent.id).is_some());
        assert_eq!(
            daemon.reserve(Operation::Credit, "order-1"),
            Reservation::Completed(TxHash::new("0x1"))
        );

        // a forgotten entry is not written back by the other process
        cli.forget(Operation::Credit, "order-1", &TxHash::new("0x1")).unwrap();
        daemon.complete(Operation::Credit, "order-2", TxHash::new("0x2")).unwrap();
        assert!(daemon.entry(Operation::Credit, "order-1").is_none());

        let reloaded = SettlementLedger::load_from_file(&path).unwrap();
        assert!(reloaded.entry(Operation::Credit, "order-1").is_none());
        assert!(reloaded.entry(Operation::Credit, "order-2").is_some());

        std::fs::remove_file(&path).unwrap_or_default();
        std::fs::remove_file(path.with_extension("lock")).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let ledger = SettlementLedger::load_from_file(temp_path()).unwrap();
        assert_eq!(ledger.summary(), LedgerSummary::default());
    }

    #[test]
    fn test_summary_counts() {
        let ledger = SettlementLedger::new(None);
        ledger.complete(Operation::Credit, "a", TxHash::new("0x1")).unwrap();
        ledger.reserve(Operation::Credit, "b");
        ledger.open_intent(RedeemIntent::new("0x1", 10, "0x2", 5)).unwrap();

        let summary = ledger.summary();
        assert_eq!(summary.completed_entries, 1);
        assert_eq!(summary.in_flight, 1);
        assert_eq!(summary.open_intents, 1);
        assert_eq!(summary.intents_by_phase.get("idle"), Some(&1));
    }
}
