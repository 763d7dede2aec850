//! Typed access to the record store.
//!
//! [`Records`] decodes stored documents into domain types and is the
//! only path through which reward records change status: every update
//! runs [`RewardRecord::apply`] inside the store's read-modify-write.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Collection, FindOptions, RecordStore, SortOrder, StoreError, find};
use crate::domain::{
    BurnRecord, MetricsSnapshot, MilestoneRecord, NewBurn, NewMetricsSnapshot, NewMilestone,
    NewReward, RecordId, RewardRecord, RewardStatus, RewardTransition,
};

/// Typed facade over a [`RecordStore`].
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("backend", &self.store.backend())
            .finish()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(collection: Collection, doc: Value) -> Result<T, StoreError> {
    let id = doc
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<no id>")
        .to_string();
    serde_json::from_value(doc).map_err(|e| StoreError::Corrupted {
        collection,
        reason: format!("record {id}: {e}"),
        backup: None,
    })
}

fn decode_all<T: DeserializeOwned>(
    collection: Collection,
    docs: Vec<Value>,
) -> Result<Vec<T>, StoreError> {
    docs.into_iter().map(|d| decode(collection, d)).collect()
}

impl Records {
    /// Wraps a store backend.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// The raw document store.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // --- rewards ---

    /// Persists a reward for a confirmed claim.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`StoreError::Corrupted`] if the
    /// stored document does not decode.
    pub async fn create_reward(&self, reward: &NewReward) -> Result<RewardRecord, StoreError> {
        let doc = self.store.create(Collection::Rewards, encode(reward)?).await?;
        decode(Collection::Rewards, doc)
    }

    /// Fetches a reward by id.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn get_reward(&self, id: RecordId) -> Result<Option<RewardRecord>, StoreError> {
        self.store
            .get(Collection::Rewards, id)
            .await?
            .map(|doc| decode(Collection::Rewards, doc))
            .transpose()
    }

    /// Applies `transition` to reward `id` atomically and returns the
    /// stored result.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] for an unknown id.
    /// - [`StoreError::InvalidTransition`] when the status machine rejects
    ///   the transition; the stored record is unchanged.
    pub async fn transition_reward(
        &self,
        id: RecordId,
        transition: RewardTransition,
    ) -> Result<RewardRecord, StoreError> {
        let patch = move |doc: &mut Value| -> Result<(), StoreError> {
            let mut record: RewardRecord = decode(Collection::Rewards, doc.clone())?;
            record.apply(transition.clone())?;
            *doc = encode(&record)?;
            Ok(())
        };
        let doc = self.store.update(Collection::Rewards, id, &patch).await?;
        let record: RewardRecord = decode(Collection::Rewards, doc)?;
        tracing::debug!(reward_id = %id, status = %record.status, "reward updated");
        Ok(record)
    }

    /// Rewards matching `predicate`, ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn find_rewards<P>(
        &self,
        predicate: P,
        options: FindOptions,
    ) -> Result<Vec<RewardRecord>, StoreError>
    where
        P: Fn(&RewardRecord) -> bool + Send,
    {
        let docs = find(
            self.store.as_ref(),
            Collection::Rewards,
            |_| true,
            FindOptions {
                sort: options.sort,
                limit: None,
            },
        )
        .await?;
        let mut rewards: Vec<RewardRecord> = decode_all(Collection::Rewards, docs)?;
        rewards.retain(|r| predicate(r));
        if let Some(limit) = options.limit {
            rewards.truncate(limit);
        }
        Ok(rewards)
    }

    /// Rewards, optionally filtered by status, newest first.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn list_rewards(
        &self,
        status: Option<RewardStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<RewardRecord>, StoreError> {
        self.find_rewards(
            move |r| status.is_none_or(|s| r.status == s),
            FindOptions {
                sort: SortOrder::Descending,
                limit,
            },
        )
        .await
    }

    // --- burns ---

    /// Persists a confirmed burn.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn create_burn(&self, burn: &NewBurn) -> Result<BurnRecord, StoreError> {
        let doc = self.store.create(Collection::Burns, encode(burn)?).await?;
        decode(Collection::Burns, doc)
    }

    /// The burn linked to `reward_id`, if one was recorded.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn burn_for_reward(&self, reward_id: RecordId) -> Result<Option<BurnRecord>, StoreError> {
        let target = reward_id.to_string();
        let docs = find(
            self.store.as_ref(),
            Collection::Burns,
            move |d| d.get("rewardId").and_then(Value::as_str) == Some(target.as_str()),
            FindOptions::oldest_first(),
        )
        .await?;
        docs.into_iter()
            .next()
            .map(|doc| decode(Collection::Burns, doc))
            .transpose()
    }

    /// Burns ordered by timestamp.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn list_burns(&self, options: FindOptions) -> Result<Vec<BurnRecord>, StoreError> {
        let docs = find(self.store.as_ref(), Collection::Burns, |_| true, options).await?;
        decode_all(Collection::Burns, docs)
    }

    // --- metrics ---

    /// Newest metrics snapshot.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn latest_metrics(&self) -> Result<Option<MetricsSnapshot>, StoreError> {
        let docs = find(
            self.store.as_ref(),
            Collection::Metrics,
            |_| true,
            FindOptions::latest(1),
        )
        .await?;
        docs.into_iter()
            .next()
            .map(|doc| decode(Collection::Metrics, doc))
            .transpose()
    }

    /// Appends a metrics snapshot.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn append_metrics(
        &self,
        snapshot: &NewMetricsSnapshot,
    ) -> Result<MetricsSnapshot, StoreError> {
        let doc = self.store.create(Collection::Metrics, encode(snapshot)?).await?;
        decode(Collection::Metrics, doc)
    }

    // --- milestones ---

    /// Seeds a milestone.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn create_milestone(
        &self,
        milestone: &NewMilestone,
    ) -> Result<MilestoneRecord, StoreError> {
        let doc = self
            .store
            .create(Collection::Milestones, encode(milestone)?)
            .await?;
        decode(Collection::Milestones, doc)
    }

    /// Milestones ordered by market-cap threshold.
    ///
    /// # Errors
    ///
    /// Returns the backend error or a decode failure.
    pub async fn list_milestones(&self) -> Result<Vec<MilestoneRecord>, StoreError> {
        let docs = self.store.all(Collection::Milestones).await?;
        let mut milestones: Vec<MilestoneRecord> = decode_all(Collection::Milestones, docs)?;
        milestones.sort_by(|a, b| a.market_cap_usd.total_cmp(&b.market_cap_usd));
        Ok(milestones)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::TxRef;
    use crate::persistence::MemoryStore;

    fn records() -> Records {
        Records::new(Arc::new(MemoryStore::new()))
    }

    async fn claimed(records: &Records) -> RewardRecord {
        let Ok(reward) = records
            .create_reward(&NewReward::claimed(
                200_000_000,
                30.0,
                false,
                TxRef::new("claim-1"),
            ))
            .await
        else {
            panic!("create should succeed");
        };
        reward
    }

    #[tokio::test]
    async fn created_reward_is_claimed_and_consistent() {
        let records = records();
        let reward = claimed(&records).await;
        assert_eq!(reward.status, RewardStatus::Claimed);
        assert!(reward.is_consistent());
        assert!(reward.tokens_bought.is_none());
        let Ok(Some(fetched)) = records.get_reward(reward.id).await else {
            panic!("reward should be found");
        };
        assert_eq!(fetched, reward);
    }

    #[tokio::test]
    async fn transitions_persist_and_stamp_updated_at() {
        let records = records();
        let reward = claimed(&records).await;
        let Ok(bought) = records
            .transition_reward(
                reward.id,
                RewardTransition::Bought {
                    tx_ref: TxRef::new("buy-1"),
                    tokens_bought: 5_000,
                    sol_used: 190_000_000,
                    sol_reserved: 10_000_000,
                },
            )
            .await
        else {
            panic!("claimed -> bought is legal");
        };
        assert_eq!(bought.status, RewardStatus::Bought);
        assert!(bought.updated_at >= reward.updated_at);
        assert_eq!(bought.created_at, reward.created_at);
    }

    #[tokio::test]
    async fn illegal_transition_leaves_record_unchanged() {
        let records = records();
        let reward = claimed(&records).await;
        let result = records
            .transition_reward(reward.id, RewardTransition::Burned)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidTransition(_))));
        let Ok(Some(after)) = records.get_reward(reward.id).await else {
            panic!("reward should be found");
        };
        assert_eq!(after, reward);
    }

    #[tokio::test]
    async fn undecodable_document_reports_corruption() {
        let records = records();
        assert!(
            records
                .store()
                .create(Collection::Rewards, json!({ "status": "exploded" }))
                .await
                .is_ok()
        );
        assert!(matches!(
            records.list_rewards(None, None).await,
            Err(StoreError::Corrupted {
                collection: Collection::Rewards,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn burn_lookup_by_reward() {
        let records = records();
        let reward = claimed(&records).await;
        let Ok(burn) = records
            .create_burn(&NewBurn {
                reward_id: reward.id,
                amount: 4_950,
                burn_tx_ref: TxRef::new("burn-1"),
                sol_spent: 190_000_000,
                sol_spent_usd: 28.5,
            })
            .await
        else {
            panic!("create should succeed");
        };
        let Ok(found) = records.burn_for_reward(reward.id).await else {
            panic!("lookup should succeed");
        };
        assert_eq!(found, Some(burn));
        assert!(matches!(records.burn_for_reward(RecordId::new()).await, Ok(None)));
    }

    #[tokio::test]
    async fn latest_metrics_is_newest() {
        let records = records();
        assert!(matches!(records.latest_metrics().await, Ok(None)));
        for reserve in [1, 2, 3] {
            let snapshot = NewMetricsSnapshot::corrected(None, 1_000, reserve, &[]);
            assert!(records.append_metrics(&snapshot).await.is_ok());
        }
        let Ok(Some(latest)) = records.latest_metrics().await else {
            panic!("a snapshot exists");
        };
        assert_eq!(latest.reserve_balance, 3);
    }

    #[tokio::test]
    async fn milestones_sorted_by_threshold() {
        let records = records();
        for (cap, label) in [(5e6, "5M"), (1e6, "1M"), (2.5e6, "2.5M")] {
            let milestone = NewMilestone {
                market_cap_usd: cap,
                burn_amount: 1,
                label: label.to_string(),
                completed: false,
            };
            assert!(records.create_milestone(&milestone).await.is_ok());
        }
        let Ok(list) = records.list_milestones().await else {
            panic!("list should succeed");
        };
        let labels: Vec<_> = list.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["1M", "2.5M", "5M"]);
    }
}
