//! Reward records and the claim → swap → burn status machine.
//!
//! A [`RewardRecord`] is created once per confirmed claim and then moves
//! forward through [`RewardStatus`] as the swap and burn steps complete.
//! Every mutation goes through [`RewardRecord::apply`], which is the one
//! place status transitions are validated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RecordId, TxRef};

/// Progress of a reward through the pipeline.
///
/// Ordered `Pending < Claimed < Bought < Burned`; `Failed` is reachable
/// from any non-terminal status. Status never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    /// Created but the claim is not yet confirmed.
    Pending,
    /// Claim confirmed; proceeds sit in the authority wallet.
    Claimed,
    /// Swap confirmed; target tokens acquired.
    Bought,
    /// Acquired tokens burned. Terminal.
    Burned,
    /// Halted with an error. Terminal.
    Failed,
}

impl RewardStatus {
    /// Position in the forward ordering, `None` for `Failed`.
    #[must_use]
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Claimed => Some(1),
            Self::Bought => Some(2),
            Self::Burned => Some(3),
            Self::Failed => None,
        }
    }

    /// Returns `true` for `Burned` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Burned | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Forward moves must be exactly one step; `Failed` is allowed from
    /// any non-terminal status.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }

    /// Lowercase status label as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Bought => "bought",
            Self::Burned => "burned",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "bought" => Ok(Self::Bought),
            "burned" => Ok(Self::Burned),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown reward status: {other}")),
        }
    }
}

/// One claim attempt and everything that happened to its proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    /// Store-generated identifier.
    pub id: RecordId,
    /// Claimed amount in lamports, as observed in the vault before the claim.
    pub reward_amount: u64,
    /// USD value of `reward_amount` at claim time.
    pub reward_amount_usd: f64,
    /// `true` when `reward_amount_usd` used the fallback rate.
    #[serde(default)]
    pub price_degraded: bool,
    /// Confirmed claim transaction.
    pub claim_tx_ref: Option<TxRef>,
    /// Current pipeline status.
    pub status: RewardStatus,
    /// Target tokens acquired by the swap (base units).
    pub tokens_bought: Option<u64>,
    /// Confirmed swap transaction.
    pub buy_tx_ref: Option<TxRef>,
    /// Lamports routed into the swap.
    pub sol_amount_used: Option<u64>,
    /// Lamports held back for transaction fees.
    pub sol_amount_reserved: Option<u64>,
    /// Swap submitted but not yet confirmed.
    #[serde(default)]
    pub pending_buy_tx_ref: Option<TxRef>,
    /// Quote's expected output for the pending swap.
    #[serde(default)]
    pub pending_tokens_expected: Option<u64>,
    /// Burn submitted but not yet confirmed.
    #[serde(default)]
    pub pending_burn_tx_ref: Option<TxRef>,
    /// Base units the pending burn destroys.
    #[serde(default)]
    pub pending_burn_amount: Option<u64>,
    /// Set just before a swap is handed to the ledger. A record with an
    /// intent but no pending reference may already have an unrecorded swap
    /// in flight and must never be resubmitted.
    #[serde(default)]
    pub buy_intent_at: Option<DateTime<Utc>>,
    /// Burn counterpart of `buy_intent_at`.
    #[serde(default)]
    pub burn_intent_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last write.
    pub updated_at: DateTime<Utc>,
    /// Failure reason once `status = failed`.
    pub error_message: Option<String>,
}

/// Payload for creating a reward record after a confirmed claim.
///
/// The store adds `id`, `createdAt` and `updatedAt`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReward {
    /// Claimed lamports.
    pub reward_amount: u64,
    /// USD valuation.
    pub reward_amount_usd: f64,
    /// Valuation used the fallback rate.
    pub price_degraded: bool,
    /// Confirmed claim transaction.
    pub claim_tx_ref: TxRef,
    /// Always `claimed`.
    pub status: RewardStatus,
}

impl NewReward {
    /// Builds the record payload for a confirmed claim.
    #[must_use]
    pub fn claimed(
        reward_amount: u64,
        reward_amount_usd: f64,
        price_degraded: bool,
        claim_tx_ref: TxRef,
    ) -> Self {
        Self {
            reward_amount,
            reward_amount_usd,
            price_degraded,
            claim_tx_ref,
            status: RewardStatus::Claimed,
        }
    }
}

/// A validated mutation of a [`RewardRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum RewardTransition {
    /// About to submit the swap; written before the ledger sees it.
    BuyIntent,
    /// Swap transaction submitted; confirmation outstanding.
    BuySubmitted {
        /// Submitted swap transaction.
        tx_ref: TxRef,
        /// Output promised by the quote.
        expected_tokens: u64,
        /// Lamports routed into the swap.
        sol_used: u64,
        /// Lamports held back for fees.
        sol_reserved: u64,
    },
    /// Swap confirmed.
    Bought {
        /// Confirmed swap transaction.
        tx_ref: TxRef,
        /// Tokens credited to the record.
        tokens_bought: u64,
        /// Lamports routed into the swap.
        sol_used: u64,
        /// Lamports held back for fees.
        sol_reserved: u64,
    },
    /// About to submit the burn; written before the ledger sees it.
    BurnIntent,
    /// Burn transaction submitted; confirmation outstanding.
    BurnSubmitted {
        /// Submitted burn transaction.
        tx_ref: TxRef,
        /// Base units being burned.
        amount: u64,
    },
    /// Burn confirmed and its burn record written.
    Burned,
    /// Step failed.
    Failed {
        /// Human-readable reason.
        message: String,
    },
}

impl RewardTransition {
    /// Short label used in errors and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::BuyIntent => "buy_intent",
            Self::BuySubmitted { .. } => "buy_submitted",
            Self::Bought { .. } => "bought",
            Self::BurnIntent => "burn_intent",
            Self::BurnSubmitted { .. } => "burn_submitted",
            Self::Burned => "burned",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reward {id}: cannot apply {attempted} while {from}")]
pub struct TransitionError {
    /// Record the transition targeted.
    pub id: RecordId,
    /// Status at the time of the attempt.
    pub from: RewardStatus,
    /// Transition label.
    pub attempted: &'static str,
}

impl RewardRecord {
    /// Applies `transition`, enforcing forward-only status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the transition is not legal from
    /// the current status. The record is left untouched in that case.
    pub fn apply(&mut self, transition: RewardTransition) -> Result<(), TransitionError> {
        let attempted = transition.label();
        match transition {
            RewardTransition::BuyIntent => {
                if self.status != RewardStatus::Claimed {
                    return Err(self.reject(attempted));
                }
                self.buy_intent_at = Some(Utc::now());
            }
            RewardTransition::BuySubmitted {
                tx_ref,
                expected_tokens,
                sol_used,
                sol_reserved,
            } => {
                if self.status != RewardStatus::Claimed {
                    return Err(self.reject(attempted));
                }
                self.pending_buy_tx_ref = Some(tx_ref);
                self.pending_tokens_expected = Some(expected_tokens);
                self.sol_amount_used = Some(sol_used);
                self.sol_amount_reserved = Some(sol_reserved);
            }
            RewardTransition::Bought {
                tx_ref,
                tokens_bought,
                sol_used,
                sol_reserved,
            } => {
                if !self.status.can_transition_to(RewardStatus::Bought) {
                    return Err(self.reject(attempted));
                }
                self.status = RewardStatus::Bought;
                self.buy_tx_ref = Some(tx_ref);
                self.tokens_bought = Some(tokens_bought);
                self.sol_amount_used = Some(sol_used);
                self.sol_amount_reserved = Some(sol_reserved);
                self.pending_buy_tx_ref = None;
                self.pending_tokens_expected = None;
                self.buy_intent_at = None;
            }
            RewardTransition::BurnIntent => {
                if self.status != RewardStatus::Bought {
                    return Err(self.reject(attempted));
                }
                self.burn_intent_at = Some(Utc::now());
            }
            RewardTransition::BurnSubmitted { tx_ref, amount } => {
                if self.status != RewardStatus::Bought {
                    return Err(self.reject(attempted));
                }
                self.pending_burn_tx_ref = Some(tx_ref);
                self.pending_burn_amount = Some(amount);
            }
            RewardTransition::Burned => {
                if !self.status.can_transition_to(RewardStatus::Burned) {
                    return Err(self.reject(attempted));
                }
                self.status = RewardStatus::Burned;
                self.pending_burn_tx_ref = None;
                self.pending_burn_amount = None;
                self.burn_intent_at = None;
            }
            RewardTransition::Failed { message } => {
                if !self.status.can_transition_to(RewardStatus::Failed) {
                    return Err(self.reject(attempted));
                }
                self.status = RewardStatus::Failed;
                self.error_message = Some(message);
            }
        }
        Ok(())
    }

    fn reject(&self, attempted: &'static str) -> TransitionError {
        TransitionError {
            id: self.id,
            from: self.status,
            attempted,
        }
    }

    /// USD value of `lamports` at the rate captured when this reward was
    /// claimed.
    #[must_use]
    pub fn usd_value_of(&self, lamports: u64) -> f64 {
        if self.reward_amount == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let share = lamports as f64 / self.reward_amount as f64;
        self.reward_amount_usd * share
    }

    /// Checks the reference/status invariants of a stored record.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let at_least = |min: RewardStatus| match (self.status.rank(), min.rank()) {
            (Some(have), Some(need)) => have >= need,
            // Failed records keep whatever references they reached.
            (None, _) => true,
            (Some(_), None) => false,
        };
        (self.claim_tx_ref.is_none() || at_least(RewardStatus::Claimed))
            && (self.buy_tx_ref.is_none() || at_least(RewardStatus::Bought))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn claimed_record() -> RewardRecord {
        let now = Utc::now();
        RewardRecord {
            id: RecordId::new(),
            reward_amount: 500_000_000,
            reward_amount_usd: 75.0,
            price_degraded: false,
            claim_tx_ref: Some(TxRef::new("claim-sig")),
            status: RewardStatus::Claimed,
            tokens_bought: None,
            buy_tx_ref: None,
            sol_amount_used: None,
            sol_amount_reserved: None,
            pending_buy_tx_ref: None,
            pending_tokens_expected: None,
            pending_burn_tx_ref: None,
            pending_burn_amount: None,
            buy_intent_at: None,
            burn_intent_at: None,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    fn bought() -> RewardTransition {
        RewardTransition::Bought {
            tx_ref: TxRef::new("buy-sig"),
            tokens_bought: 42_000,
            sol_used: 475_000_000,
            sol_reserved: 25_000_000,
        }
    }

    #[test]
    fn status_ordering_is_forward_only() {
        assert!(RewardStatus::Pending.can_transition_to(RewardStatus::Claimed));
        assert!(RewardStatus::Claimed.can_transition_to(RewardStatus::Bought));
        assert!(RewardStatus::Bought.can_transition_to(RewardStatus::Burned));
        assert!(!RewardStatus::Claimed.can_transition_to(RewardStatus::Burned));
        assert!(!RewardStatus::Bought.can_transition_to(RewardStatus::Claimed));
        assert!(!RewardStatus::Burned.can_transition_to(RewardStatus::Failed));
        assert!(!RewardStatus::Failed.can_transition_to(RewardStatus::Claimed));
        assert!(RewardStatus::Pending.can_transition_to(RewardStatus::Failed));
    }

    #[test]
    fn full_happy_path() {
        let mut record = claimed_record();
        assert!(record.apply(bought()).is_ok());
        assert!(
            record
                .apply(RewardTransition::BurnSubmitted {
                    tx_ref: TxRef::new("burn-sig"),
                    amount: 41_580,
                })
                .is_ok()
        );
        assert_eq!(record.pending_burn_tx_ref, Some(TxRef::new("burn-sig")));
        assert!(record.apply(RewardTransition::Burned).is_ok());
        assert_eq!(record.status, RewardStatus::Burned);
        assert!(record.pending_burn_tx_ref.is_none());
        assert!(record.pending_burn_amount.is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn buy_submission_keeps_status() {
        let mut record = claimed_record();
        let result = record.apply(RewardTransition::BuySubmitted {
            tx_ref: TxRef::new("pending-buy"),
            expected_tokens: 1_000,
            sol_used: 950,
            sol_reserved: 50,
        });
        assert!(result.is_ok());
        assert_eq!(record.status, RewardStatus::Claimed);
        assert_eq!(record.pending_tokens_expected, Some(1_000));

        assert!(record.apply(bought()).is_ok());
        assert!(record.pending_buy_tx_ref.is_none());
        assert_eq!(record.buy_tx_ref, Some(TxRef::new("buy-sig")));
    }

    #[test]
    fn intents_are_stamped_and_cleared_on_confirmation() {
        let mut record = claimed_record();
        assert!(record.apply(RewardTransition::BurnIntent).is_err());
        assert!(record.apply(RewardTransition::BuyIntent).is_ok());
        assert!(record.buy_intent_at.is_some());
        assert_eq!(record.status, RewardStatus::Claimed);

        assert!(record.apply(bought()).is_ok());
        assert!(record.buy_intent_at.is_none());
        assert!(record.apply(RewardTransition::BuyIntent).is_err());

        assert!(record.apply(RewardTransition::BurnIntent).is_ok());
        assert!(record.burn_intent_at.is_some());
        assert!(record.apply(RewardTransition::Burned).is_ok());
        assert!(record.burn_intent_at.is_none());
    }

    #[test]
    fn records_written_before_intents_still_load() {
        let record = claimed_record();
        let Ok(mut doc) = serde_json::to_value(&record) else {
            panic!("serialize failed");
        };
        let Some(obj) = doc.as_object_mut() else {
            panic!("record is not an object");
        };
        obj.remove("buyIntentAt");
        obj.remove("burnIntentAt");
        let Ok(loaded) = serde_json::from_value::<RewardRecord>(doc) else {
            panic!("legacy document rejected");
        };
        assert_eq!(loaded, record);
    }

    #[test]
    fn cannot_burn_before_buying() {
        let mut record = claimed_record();
        let Err(err) = record.apply(RewardTransition::Burned) else {
            panic!("burn from claimed must be rejected");
        };
        assert_eq!(err.from, RewardStatus::Claimed);
        assert_eq!(err.attempted, "burned");
        assert_eq!(record.status, RewardStatus::Claimed);
    }

    #[test]
    fn failed_is_terminal() {
        let mut record = claimed_record();
        assert!(
            record
                .apply(RewardTransition::Failed {
                    message: "quote unavailable".to_string()
                })
                .is_ok()
        );
        assert_eq!(record.claim_tx_ref, Some(TxRef::new("claim-sig")));
        assert!(record.apply(bought()).is_err());
        assert!(
            record
                .apply(RewardTransition::Failed {
                    message: "again".to_string()
                })
                .is_err()
        );
        assert_eq!(record.error_message.as_deref(), Some("quote unavailable"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("BOUGHT".parse::<RewardStatus>(), Ok(RewardStatus::Bought));
        assert!("minted".parse::<RewardStatus>().is_err());
    }

    #[test]
    fn serde_uses_camel_case_fields() {
        let record = claimed_record();
        let Ok(json) = serde_json::to_value(&record) else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("status"), Some(&serde_json::json!("claimed")));
        assert_eq!(json.get("claimTxRef"), Some(&serde_json::json!("claim-sig")));
        assert!(json.get("rewardAmountUsd").is_some());
    }
}
