//! Domain layer: records, status machine, identifiers and events.
//!
//! This module holds the persisted record types (rewards, burns,
//! metrics snapshots, milestones), the reward status machine, opaque
//! ledger identifiers, amount helpers, and the event bus used to
//! broadcast pipeline progress.

pub mod address;
pub mod amount;
pub mod burn;
pub mod event_bus;
pub mod metrics;
pub mod milestone;
pub mod pipeline_event;
pub mod record_id;
pub mod reward;

pub use address::{Address, SignerRef, TxRef};
pub use burn::{BurnRecord, NewBurn};
pub use event_bus::EventBus;
pub use metrics::{DriftTolerance, MetricsSnapshot, NewMetricsSnapshot, SnapshotSource};
pub use milestone::{MilestoneRecord, NewMilestone};
pub use pipeline_event::PipelineEvent;
pub use record_id::RecordId;
pub use reward::{NewReward, RewardRecord, RewardStatus, RewardTransition, TransitionError};
