//! Redeem intent records and their phase state machine.
//!
//! ```text
//! Idle → DebitSubmitted → DebitConfirmed → RewardSubmitted → Complete
//!   ↓          ↓                ↓  ↑              ↓
//! Failed(Debit)           Failed(Reward) ←────────┘
//!                                ↓  ↑
//!                        CompensationSubmitted → Compensated
//! ```
//!
//! `DebitConfirmed` may also go straight to `CompensationSubmitted`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::blockchain::types::TxHash;

/// Which half of a redemption failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Debit,
    Reward,
}

/// Progress of a debit-then-reward redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemPhase {
    Idle,
    DebitSubmitted,
    DebitConfirmed,
    RewardSubmitted,
    Complete,
    Failed { stage: FailureStage },
    /// A re-credit of the debited points was sent but has not been seen to land.
    CompensationSubmitted,
    /// Points were credited back after the reward could not be paid.
    Compensated,
}

impl RedeemPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedeemPhase::Idle => "idle",
            RedeemPhase::DebitSubmitted => "debit_submitted",
            RedeemPhase::DebitConfirmed => "debit_confirmed",
            RedeemPhase::RewardSubmitted => "reward_submitted",
            RedeemPhase::Complete => "complete",
            RedeemPhase::Failed {
                stage: FailureStage::Debit,
            } => "failed_debit",
            RedeemPhase::Failed {
                stage: FailureStage::Reward,
            } => "failed_reward",
            RedeemPhase::CompensationSubmitted => "compensation_submitted",
            RedeemPhase::Compensated => "compensated",
        }
    }

    /// Nothing further will happen to an intent in this phase.
    ///
    /// `Failed(Reward)` is not terminal: the user's points are gone and the
    /// reconciler still owes them either a reward or a re-credit.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RedeemPhase::Complete
                | RedeemPhase::Compensated
                | RedeemPhase::Failed {
                    stage: FailureStage::Debit
                }
        )
    }

    /// Points have been debited on-chain but no reward is known to have landed.
    pub fn owes_reward(&self) -> bool {
        matches!(
            self,
            RedeemPhase::DebitConfirmed
                | RedeemPhase::Failed {
                    stage: FailureStage::Reward
                }
        )
    }

    pub fn can_transition_to(&self, next: RedeemPhase) -> bool {
        use FailureStage::*;
        use RedeemPhase::*;

        matches!(
            (*self, next),
            (Idle, DebitSubmitted)
                | (Idle, Failed { stage: Debit })
                | (DebitSubmitted, DebitConfirmed)
                | (DebitSubmitted, Failed { stage: Debit })
                | (DebitConfirmed, RewardSubmitted)
                | (DebitConfirmed, Failed { stage: Reward })
                | (DebitConfirmed, CompensationSubmitted)
                | (RewardSubmitted, Complete)
                | (RewardSubmitted, Failed { stage: Reward })
                | (Failed { stage: Reward }, RewardSubmitted)
                | (Failed { stage: Reward }, CompensationSubmitted)
                | (CompensationSubmitted, Compensated)
                | (CompensationSubmitted, Failed { stage: Reward })
        )
    }
}

impl fmt::Display for RedeemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one redemption, written before the debit is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemIntent {
    pub id: Uuid,
    pub user: String,
    pub points: u128,
    pub reward_token: String,
    pub reward_amount: u128,
    pub phase: RedeemPhase,
    #[serde(default)]
    pub debit_tx: Option<TxHash>,
    #[serde(default)]
    pub reward_tx: Option<TxHash>,
    #[serde(default)]
    pub compensation_tx: Option<TxHash>,
    #[serde(default)]
    pub reward_attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl RedeemIntent {
    pub fn new(user: impl Into<String>, points: u128, reward_token: impl Into<String>, reward_amount: u128) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            points,
            reward_token: reward_token.into(),
            reward_amount,
            phase: RedeemPhase::Idle,
            debit_tx: None,
            reward_tx: None,
            compensation_tx: None,
            reward_attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seconds since the last recorded change.
    pub fn idle_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RedeemPhase; 9] = [
        RedeemPhase::Idle,
        RedeemPhase::DebitSubmitted,
        RedeemPhase::DebitConfirmed,
        RedeemPhase::RewardSubmitted,
        RedeemPhase::Complete,
        RedeemPhase::Failed {
            stage: FailureStage::Debit,
        },
        RedeemPhase::Failed {
            stage: FailureStage::Reward,
        },
        RedeemPhase::CompensationSubmitted,
        RedeemPhase::Compensated,
    ];

    #[test]
    fn test_happy_path_is_allowed() {
        let path = [
            RedeemPhase::Idle,
            RedeemPhase::DebitSubmitted,
            RedeemPhase::DebitConfirmed,
            RedeemPhase::RewardSubmitted,
            RedeemPhase::Complete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_reward_cannot_precede_debit_confirmation() {
        assert!(!RedeemPhase::Idle.can_transition_to(RedeemPhase::RewardSubmitted));
        assert!(!RedeemPhase::DebitSubmitted.can_transition_to(RedeemPhase::RewardSubmitted));
        assert!(!RedeemPhase::DebitSubmitted.can_transition_to(RedeemPhase::Compensated));
    }

    #[test]
    fn test_terminal_phases_have_no_exits() {
        for from in ALL.iter().filter(|p| p.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_failed_reward_can_be_retried_or_compensated() {
        let failed = RedeemPhase::Failed {
            stage: FailureStage::Reward,
        };
        assert!(!failed.is_terminal());
        assert!(failed.owes_reward());
        assert!(failed.can_transition_to(RedeemPhase::RewardSubmitted));
        assert!(failed.can_transition_to(RedeemPhase::CompensationSubmitted));
        assert!(!failed.can_transition_to(RedeemPhase::Compensated));
        assert!(!failed.can_transition_to(RedeemPhase::Complete));
    }

    #[test]
    fn test_compensation_resolves_before_completing() {
        let pending = RedeemPhase::CompensationSubmitted;
        assert!(!pending.is_terminal());
        // the credit is in flight; nothing else may be sent for it
        assert!(!pending.owes_reward());
        assert!(pending.can_transition_to(RedeemPhase::Compensated));
        assert!(pending.can_transition_to(RedeemPhase::Failed {
            stage: FailureStage::Reward
        }));
        assert!(!pending.can_transition_to(RedeemPhase::RewardSubmitted));
        assert!(!RedeemPhase::DebitConfirmed.can_transition_to(RedeemPhase::Compensated));
    }

    #[test]
    fn test_debit_failures() {
        let failed = RedeemPhase::Failed {
            stage: FailureStage::Debit,
        };
        assert!(RedeemPhase::Idle.can_transition_to(failed));
        assert!(RedeemPhase::DebitSubmitted.can_transition_to(failed));
        assert!(!RedeemPhase::DebitConfirmed.can_transition_to(failed));
    }

    #[test]
    fn test_phase_serde() {
        let json = serde_json::to_string(&RedeemPhase::DebitConfirmed).unwrap();
        assert_eq!(json, "\"debit_confirmed\"");

        let failed = RedeemPhase::Failed {
            stage: FailureStage::Reward,
        };
        let json = serde_json::to_string(&failed).unwrap();
        let back: RedeemPhase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn test_new_intent_starts_idle() {
        let intent = RedeemIntent::new("0x123", 100, "0x456", 10);
        assert_eq!(intent.phase, RedeemPhase::Idle);
        assert_eq!(intent.reward_attempts, 0);
        assert!(intent.debit_tx.is_none());
        assert_eq!(intent.idle_secs(intent.updated_at + 5), 5);
    }
}
