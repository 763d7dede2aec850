//! Read-model DTOs for rewards, burns, metrics and milestones.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{BurnRecord, MetricsSnapshot, MilestoneRecord, RewardRecord, TxRef};

fn tx(tx_ref: Option<&TxRef>) -> Option<String> {
    tx_ref.map(ToString::to_string)
}

fn amount(value: Option<u64>) -> Option<String> {
    value.map(|v| v.to_string())
}

/// One reward and its progress through the pipeline.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RewardDto {
    /// Reward record id.
    pub id: uuid::Uuid,
    /// `pending`, `claimed`, `bought`, `burned` or `failed`.
    pub status: String,
    /// Claimed lamports (string-encoded).
    pub reward_amount: String,
    /// USD value at claim time.
    pub reward_amount_usd: f64,
    /// Valuation used the fallback rate.
    pub price_degraded: bool,
    /// Confirmed claim transaction.
    pub claim_tx_ref: Option<String>,
    /// Tokens bought (string-encoded).
    pub tokens_bought: Option<String>,
    /// Confirmed swap transaction.
    pub buy_tx_ref: Option<String>,
    /// Lamports routed into the swap (string-encoded).
    pub sol_amount_used: Option<String>,
    /// Lamports kept for fees (string-encoded).
    pub sol_amount_reserved: Option<String>,
    /// Swap awaiting confirmation.
    pub pending_buy_tx_ref: Option<String>,
    /// Burn awaiting confirmation.
    pub pending_burn_tx_ref: Option<String>,
    /// Failure reason.
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<&RewardRecord> for RewardDto {
    fn from(r: &RewardRecord) -> Self {
        Self {
            id: *r.id.as_uuid(),
            status: r.status.to_string(),
            reward_amount: r.reward_amount.to_string(),
            reward_amount_usd: r.reward_amount_usd,
            price_degraded: r.price_degraded,
            claim_tx_ref: tx(r.claim_tx_ref.as_ref()),
            tokens_bought: amount(r.tokens_bought),
            buy_tx_ref: tx(r.buy_tx_ref.as_ref()),
            sol_amount_used: amount(r.sol_amount_used),
            sol_amount_reserved: amount(r.sol_amount_reserved),
            pending_buy_tx_ref: tx(r.pending_buy_tx_ref.as_ref()),
            pending_burn_tx_ref: tx(r.pending_burn_tx_ref.as_ref()),
            error_message: r.error_message.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Response body for `GET /rewards`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RewardListResponse {
    /// Rewards, newest first.
    pub data: Vec<RewardDto>,
    /// Number of rows returned.
    pub count: usize,
}

/// Response body for `GET /rewards/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RewardDetailResponse {
    /// The reward.
    pub reward: RewardDto,
    /// Its burn, once recorded.
    pub burn: Option<BurnDto>,
}

/// One confirmed burn.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BurnDto {
    /// Burn record id.
    pub id: uuid::Uuid,
    /// Linked reward.
    pub reward_id: uuid::Uuid,
    /// Tokens destroyed (string-encoded).
    pub amount: String,
    /// Burn transaction.
    pub burn_tx_ref: String,
    /// Lamports spent acquiring the tokens (string-encoded).
    pub sol_spent: String,
    /// USD value of `sol_spent`.
    pub sol_spent_usd: f64,
    /// When the burn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl From<&BurnRecord> for BurnDto {
    fn from(b: &BurnRecord) -> Self {
        Self {
            id: *b.id.as_uuid(),
            reward_id: *b.reward_id.as_uuid(),
            amount: b.amount.to_string(),
            burn_tx_ref: b.burn_tx_ref.to_string(),
            sol_spent: b.sol_spent.to_string(),
            sol_spent_usd: b.sol_spent_usd,
            timestamp: b.timestamp,
        }
    }
}

/// Response body for `GET /burns`.
#[derive(Debug, Serialize, ToSchema)]
pub struct BurnListResponse {
    /// Burns, newest first.
    pub data: Vec<BurnDto>,
    /// Number of rows returned.
    pub count: usize,
    /// Sum of `amount` over the returned rows (string-encoded).
    pub total_burned: String,
}

/// Supply and reserve snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricsDto {
    /// Snapshot id.
    pub id: uuid::Uuid,
    /// Total supply (string-encoded).
    pub total_supply: String,
    /// Circulating supply (string-encoded).
    pub circulating_supply: String,
    /// Reserve wallet balance in lamports (string-encoded).
    pub reserve_balance: String,
    /// Cumulative burned base units per category (string-encoded).
    pub burned_by_category: BTreeMap<String, String>,
    /// `setup` or `reconciler`.
    pub source: String,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
}

impl From<&MetricsSnapshot> for MetricsDto {
    fn from(m: &MetricsSnapshot) -> Self {
        let source = serde_json::to_value(m.source)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            id: *m.id.as_uuid(),
            total_supply: m.total_supply.to_string(),
            circulating_supply: m.circulating_supply.to_string(),
            reserve_balance: m.reserve_balance.to_string(),
            burned_by_category: m
                .burned_by_category
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            source,
            timestamp: m.timestamp,
        }
    }
}

/// Response body for `GET /metrics/latest`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    /// Latest snapshot; `null` before the first drift check.
    pub data: Option<MetricsDto>,
}

/// A market-cap burn milestone.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MilestoneDto {
    /// Milestone id.
    pub id: uuid::Uuid,
    /// Unlocking market cap in USD.
    pub market_cap_usd: f64,
    /// Tokens to burn (string-encoded).
    pub burn_amount: String,
    /// Display label.
    pub label: String,
    /// Whether the burn has happened.
    pub completed: bool,
}

impl From<&MilestoneRecord> for MilestoneDto {
    fn from(m: &MilestoneRecord) -> Self {
        Self {
            id: *m.id.as_uuid(),
            market_cap_usd: m.market_cap_usd,
            burn_amount: m.burn_amount.to_string(),
            label: m.label.clone(),
            completed: m.completed,
        }
    }
}

/// Response body for `GET /milestones`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MilestoneListResponse {
    /// Milestones by ascending market cap.
    pub data: Vec<MilestoneDto>,
    /// Number of rows returned.
    pub count: usize,
}
