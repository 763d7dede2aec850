//! Domain events reflecting pipeline progress.
//!
//! Every step publishes a [`PipelineEvent`] through the
//! [`super::EventBus`] after its record write is acknowledged. Events are
//! broadcast to WebSocket subscribers; the record store stays the source
//! of truth.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{RecordId, RewardStatus};

/// Domain event emitted after every pipeline state change.
///
/// Token and lamport amounts are strings so JSON consumers never lose
/// precision on large u64 values.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A scheduled or manual run began.
    RunStarted {
        /// Run correlation id.
        run_id: String,
        /// Start timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Claim confirmed and reward record created.
    RewardClaimed {
        /// Created reward record.
        reward_id: RecordId,
        /// Claimed lamports.
        lamports: String,
        /// Claim transaction.
        tx_ref: String,
        /// Whether the USD value used the fallback rate.
        price_degraded: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Swap confirmed.
    TokensBought {
        /// Reward record.
        reward_id: RecordId,
        /// Lamports spent.
        sol_used: String,
        /// Tokens acquired.
        tokens: String,
        /// Swap transaction.
        tx_ref: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Burn confirmed and burn record written.
    TokensBurned {
        /// Reward record.
        reward_id: RecordId,
        /// Burn record.
        burn_id: RecordId,
        /// Tokens destroyed.
        amount: String,
        /// Burn transaction.
        tx_ref: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal outcome.
    RunFinished {
        /// Run correlation id.
        run_id: String,
        /// Outcome label (`completed`, `aborted`, `failed`, `cancelled`).
        outcome: String,
        /// Wall-clock duration.
        duration_ms: u64,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The reconciler advanced a stalled record.
    RecordRecovered {
        /// Reward record.
        reward_id: RecordId,
        /// Status before repair.
        from: RewardStatus,
        /// Status after repair.
        to: RewardStatus,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A record was marked failed.
    RecordFailed {
        /// Reward record.
        reward_id: RecordId,
        /// Failure reason.
        reason: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A corrected metrics snapshot was appended.
    MetricsCorrected {
        /// New snapshot.
        snapshot_id: RecordId,
        /// Reserve balance previously recorded (lamports).
        recorded_reserve: String,
        /// Reserve balance observed on-chain (lamports).
        observed_reserve: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Every event type label, in pipeline order.
    pub const EVENT_TYPES: [&'static str; 8] = [
        "run_started",
        "reward_claimed",
        "tokens_bought",
        "tokens_burned",
        "run_finished",
        "record_recovered",
        "record_failed",
        "metrics_corrected",
    ];

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RewardClaimed { .. } => "reward_claimed",
            Self::TokensBought { .. } => "tokens_bought",
            Self::TokensBurned { .. } => "tokens_burned",
            Self::RunFinished { .. } => "run_finished",
            Self::RecordRecovered { .. } => "record_recovered",
            Self::RecordFailed { .. } => "record_failed",
            Self::MetricsCorrected { .. } => "metrics_corrected",
        }
    }

    /// Returns the reward this event concerns, if any.
    #[must_use]
    pub const fn reward_id(&self) -> Option<RecordId> {
        match self {
            Self::RewardClaimed { reward_id, .. }
            | Self::TokensBought { reward_id, .. }
            | Self::TokensBurned { reward_id, .. }
            | Self::RecordRecovered { reward_id, .. }
            | Self::RecordFailed { reward_id, .. } => Some(*reward_id),
            Self::RunStarted { .. } | Self::RunFinished { .. } | Self::MetricsCorrected { .. } => {
                None
            }
        }
    }
}
