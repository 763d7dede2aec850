//! Point-in-time supply and reserve snapshots.
//!
//! Snapshots are append-only; the newest by timestamp is authoritative.
//! Pipeline steps never write them. The reconciler appends a corrected
//! snapshot when the recorded reserve drifts from the wallet balance,
//! folding burn records into the cumulative burned totals.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BurnRecord, RecordId};

/// Burn category for tokens bought back with claimed rewards.
pub const BUYBACK_CATEGORY: &str = "buyback";

/// Who wrote a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Initial asset setup.
    Setup,
    /// Drift correction pass.
    Reconciler,
}

/// Stored supply/reserve snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Store-generated identifier.
    pub id: RecordId,
    /// Total token supply at creation (base units).
    pub total_supply: u64,
    /// `total_supply` minus everything burned.
    pub circulating_supply: u64,
    /// Authority wallet balance in lamports.
    pub reserve_balance: u64,
    /// Cumulative burned base units keyed by category.
    #[serde(default)]
    pub burned_by_category: BTreeMap<String, u64>,
    /// Writer of the snapshot.
    pub source: SnapshotSource,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
}

/// Payload for appending a snapshot. The store adds `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMetricsSnapshot {
    /// Total token supply.
    pub total_supply: u64,
    /// Circulating supply.
    pub circulating_supply: u64,
    /// Reserve balance in lamports.
    pub reserve_balance: u64,
    /// Cumulative burned by category.
    pub burned_by_category: BTreeMap<String, u64>,
    /// Writer of the snapshot.
    pub source: SnapshotSource,
}

impl MetricsSnapshot {
    /// Sum of all burned categories.
    #[must_use]
    pub fn total_burned(&self) -> u64 {
        self.burned_by_category
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

impl NewMetricsSnapshot {
    /// Builds a corrected snapshot from the observed reserve balance.
    ///
    /// Non-buyback categories are carried over from `previous`; the
    /// buyback total is re-folded from `burns`.
    #[must_use]
    pub fn corrected(
        previous: Option<&MetricsSnapshot>,
        default_total_supply: u64,
        reserve_balance: u64,
        burns: &[BurnRecord],
    ) -> Self {
        let total_supply = previous.map_or(default_total_supply, |p| p.total_supply);
        let mut burned_by_category = previous
            .map(|p| p.burned_by_category.clone())
            .unwrap_or_default();
        let buyback = burns
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.amount));
        burned_by_category.insert(BUYBACK_CATEGORY.to_string(), buyback);

        let burned = burned_by_category
            .values()
            .fold(0u64, |acc, v| acc.saturating_add(*v));

        Self {
            total_supply,
            circulating_supply: total_supply.saturating_sub(burned),
            reserve_balance,
            burned_by_category,
            source: SnapshotSource::Reconciler,
        }
    }
}

/// Absolute and relative tolerance for reserve drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftTolerance {
    /// Maximum tolerated absolute difference in lamports.
    pub absolute_lamports: u64,
    /// Maximum tolerated difference relative to the recorded value, in bps.
    pub relative_bps: u16,
}

impl DriftTolerance {
    /// Returns `true` when `observed` differs from `recorded` by more than
    /// either tolerance.
    #[must_use]
    pub fn exceeded(&self, recorded: u64, observed: u64) -> bool {
        let diff = recorded.abs_diff(observed);
        if diff > self.absolute_lamports {
            return true;
        }
        if recorded == 0 {
            return diff > 0 && self.absolute_lamports == 0;
        }
        let relative = u128::from(diff) * 10_000 / u128::from(recorded);
        relative > u128::from(self.relative_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TxRef;

    fn burn(amount: u64) -> BurnRecord {
        BurnRecord {
            id: RecordId::new(),
            reward_id: RecordId::new(),
            amount,
            burn_tx_ref: TxRef::new("sig"),
            sol_spent: 1,
            sol_spent_usd: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn corrected_folds_buyback_burns() {
        let previous = MetricsSnapshot {
            id: RecordId::new(),
            total_supply: 1_000_000,
            circulating_supply: 990_000,
            reserve_balance: 5,
            burned_by_category: BTreeMap::from([
                ("milestone".to_string(), 10_000),
                (BUYBACK_CATEGORY.to_string(), 1),
            ]),
            source: SnapshotSource::Setup,
            timestamp: Utc::now(),
        };
        let next =
            NewMetricsSnapshot::corrected(Some(&previous), 0, 77, &[burn(300), burn(200)]);
        assert_eq!(next.total_supply, 1_000_000);
        assert_eq!(next.reserve_balance, 77);
        assert_eq!(next.burned_by_category.get(BUYBACK_CATEGORY), Some(&500));
        assert_eq!(next.burned_by_category.get("milestone"), Some(&10_000));
        assert_eq!(next.circulating_supply, 1_000_000 - 10_500);
        assert_eq!(next.source, SnapshotSource::Reconciler);
    }

    #[test]
    fn corrected_without_previous_uses_default_supply() {
        let next = NewMetricsSnapshot::corrected(None, 1_000, 9, &[burn(10)]);
        assert_eq!(next.total_supply, 1_000);
        assert_eq!(next.circulating_supply, 990);
    }

    #[test]
    fn drift_tolerance() {
        let tol = DriftTolerance {
            absolute_lamports: 10_000_000,
            relative_bps: 100,
        };
        // 0.5% of 1 SOL and under the absolute bound.
        assert!(!tol.exceeded(1_000_000_000, 1_005_000_000));
        // over the absolute bound.
        assert!(tol.exceeded(1_000_000_000, 1_020_000_000));
        // small absolute but large relative drift.
        assert!(tol.exceeded(1_000_000, 1_500_000));
        assert!(!tol.exceeded(0, 0));
    }
}
