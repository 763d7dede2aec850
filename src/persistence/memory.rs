//! Process-local record store.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Collection, Patch, RecordStore, StoreError, apply_patch, document_id, stamp_new};
use crate::domain::RecordId;

/// In-memory store. Contents are lost when the process exits.
///
/// A single `RwLock` covers all collections, so updates are serialized
/// and reads see every acknowledged write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError> {
        let (_, doc) = stamp_new(collection, body)?;
        let mut map = self.collections.write().await;
        map.entry(collection).or_default().push(doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: RecordId,
        patch: Patch<'_>,
    ) -> Result<Value, StoreError> {
        let mut map = self.collections.write().await;
        let slot = map
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|d| document_id(d) == Some(id)))
            .ok_or(StoreError::NotFound { collection, id })?;

        // Patch a copy so a rejected patch leaves the stored document intact.
        let mut doc = slot.clone();
        apply_patch(collection, id, &mut doc, patch)?;
        *slot = doc.clone();
        Ok(doc)
    }

    async fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Value>, StoreError> {
        let map = self.collections.read().await;
        Ok(map
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| document_id(d) == Some(id)))
            .cloned())
    }

    async fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let map = self.collections.read().await;
        Ok(map.get(&collection).cloned().unwrap_or_default())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::persistence::{FindOptions, find};

    #[tokio::test]
    async fn create_then_get() {
        let store = MemoryStore::new();
        let Ok(doc) = store.create(Collection::Burns, json!({ "amount": 9 })).await else {
            panic!("create should succeed");
        };
        let Some(id) = document_id(&doc) else {
            panic!("created documents carry an id");
        };
        let Ok(Some(found)) = store.get(Collection::Burns, id).await else {
            panic!("document should be found");
        };
        assert_eq!(found, doc);
        assert!(matches!(store.get(Collection::Rewards, id).await, Ok(None)));
    }

    #[tokio::test]
    async fn failed_patch_leaves_document_untouched() {
        let store = MemoryStore::new();
        let Ok(doc) = store.create(Collection::Rewards, json!({ "n": 1 })).await else {
            panic!("create should succeed");
        };
        let Some(id) = document_id(&doc) else {
            panic!("created documents carry an id");
        };
        let patch = |d: &mut Value| {
            *d = json!({ "n": 2 });
            Err(StoreError::Serialization("rejected".into()))
        };
        assert!(store.update(Collection::Rewards, id, &patch).await.is_err());
        let Ok(Some(after)) = store.get(Collection::Rewards, id).await else {
            panic!("document should still exist");
        };
        assert_eq!(after, doc);
    }

    #[tokio::test]
    async fn update_of_missing_id_is_not_found() {
        let store = MemoryStore::new();
        let patch = |_: &mut Value| Ok(());
        assert!(matches!(
            store
                .update(Collection::Milestones, RecordId::new(), &patch)
                .await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn find_orders_newest_first_and_limits() {
        let store = MemoryStore::new();
        for n in 0..5 {
            assert!(store.create(Collection::Metrics, json!({ "n": n })).await.is_ok());
        }
        let Ok(latest) = find(&store, Collection::Metrics, |_| true, FindOptions::latest(2)).await
        else {
            panic!("find should succeed");
        };
        let ns: Vec<_> = latest.iter().filter_map(|d| d.get("n")).cloned().collect();
        assert_eq!(ns, vec![json!(4), json!(3)]);

        let Ok(even) = find(
            &store,
            Collection::Metrics,
            |d| d.get("n").and_then(Value::as_u64).is_some_and(|n| n % 2 == 0),
            FindOptions::oldest_first(),
        )
        .await
        else {
            panic!("find should succeed");
        };
        assert_eq!(even.len(), 3);
    }
}
