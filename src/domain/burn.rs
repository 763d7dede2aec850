//! Burn records: one per confirmed burn, linked 1:1 to a reward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RecordId, TxRef};

/// A confirmed burn of acquired tokens.
///
/// Exists if and only if the linked reward has `status = burned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRecord {
    /// Store-generated identifier.
    pub id: RecordId,
    /// Reward whose proceeds were burned.
    pub reward_id: RecordId,
    /// Tokens destroyed (base units).
    pub amount: u64,
    /// Confirmed burn transaction.
    pub burn_tx_ref: TxRef,
    /// Lamports spent acquiring the burned tokens.
    pub sol_spent: u64,
    /// USD value of `sol_spent`.
    pub sol_spent_usd: f64,
    /// When the burn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Payload for creating a [`BurnRecord`]. The store adds `id` and `timestamp`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBurn {
    /// Reward whose proceeds were burned.
    pub reward_id: RecordId,
    /// Tokens destroyed.
    pub amount: u64,
    /// Confirmed burn transaction.
    pub burn_tx_ref: TxRef,
    /// Lamports spent acquiring the tokens.
    pub sol_spent: u64,
    /// USD value of `sol_spent`.
    pub sol_spent_usd: f64,
}
