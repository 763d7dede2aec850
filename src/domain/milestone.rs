//! Market-cap burn milestones.
//!
//! Seeded by the setup flow and read by the dashboard. The pipeline never
//! writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecordId;

/// A burn target unlocked at a market-capitalization threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRecord {
    /// Store-generated identifier.
    pub id: RecordId,
    /// Market cap in USD that unlocks the burn.
    pub market_cap_usd: f64,
    /// Tokens to burn when reached (base units).
    pub burn_amount: u64,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Whether the burn has been executed.
    pub completed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Payload for seeding a milestone. The store adds `id` and timestamps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMilestone {
    /// Market cap in USD that unlocks the burn.
    pub market_cap_usd: f64,
    /// Tokens to burn when reached.
    pub burn_amount: u64,
    /// Display label.
    pub label: String,
    /// Whether the burn has been executed.
    pub completed: bool,
}
