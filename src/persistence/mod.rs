//! Persistence layer: the durable record store.
//!
//! Records are JSON documents grouped into four [`Collection`]s. The
//! [`RecordStore`] trait is deliberately document-shaped: it generates
//! ids and timestamps, runs record-scoped read-modify-write updates and
//! lists a collection. The typed [`Records`] facade on top decodes the
//! documents into domain types and routes reward mutations through the
//! status machine.
//!
//! Backends: [`memory::MemoryStore`], [`file::FileStore`] (one JSON array
//! per collection) and [`postgres::PostgresStore`].

pub mod file;
pub mod memory;
pub mod postgres;
pub mod records;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::{RecordId, TransitionError};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use records::Records;

/// Named group of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Reward records.
    Rewards,
    /// Burn records.
    Burns,
    /// Metrics snapshots.
    Metrics,
    /// Milestone schedule.
    Milestones,
}

impl Collection {
    /// Every collection, in a fixed order.
    pub const ALL: [Self; 4] = [Self::Rewards, Self::Burns, Self::Metrics, Self::Milestones];

    /// Stored collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rewards => "rewards",
            Self::Burns => "burns",
            Self::Metrics => "metrics",
            Self::Milestones => "milestones",
        }
    }

    /// Document field holding the creation time.
    #[must_use]
    pub const fn created_field(self) -> &'static str {
        match self {
            Self::Burns | Self::Metrics => "timestamp",
            Self::Rewards | Self::Milestones => "createdAt",
        }
    }

    /// Whether documents carry an `updatedAt` field. Burns and metrics
    /// snapshots are append-only.
    #[must_use]
    pub const fn tracks_updates(self) -> bool {
        matches!(self, Self::Rewards | Self::Milestones)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// Store-level failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document with this id in the collection.
    #[error("{collection} record {id} not found")]
    NotFound {
        /// Searched collection.
        collection: Collection,
        /// Missing id.
        id: RecordId,
    },

    /// A stored document or collection file could not be decoded.
    #[error("{collection} store is corrupted: {reason}")]
    Corrupted {
        /// Affected collection.
        collection: Collection,
        /// Decoder message.
        reason: String,
        /// Copy of the corrupt file, when one was written.
        backup: Option<PathBuf>,
    },

    /// Filesystem failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A document could not be encoded or is not a JSON object.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A patch rejected the status transition it was asked to apply.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(sqlx::Error::Migrate(Box::new(err)))
    }
}

/// Record-scoped mutation run inside [`RecordStore::update`].
pub type Patch<'a> = &'a (dyn Fn(&mut Value) -> Result<(), StoreError> + Send + Sync);

/// Sort direction over a collection's creation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

/// Ordering and truncation for [`find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOptions {
    /// Sort by creation time.
    pub sort: SortOrder,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Newest first, at most `limit` documents.
    #[must_use]
    pub const fn latest(limit: usize) -> Self {
        Self {
            sort: SortOrder::Descending,
            limit: Some(limit),
        }
    }

    /// Oldest first, unbounded.
    #[must_use]
    pub const fn oldest_first() -> Self {
        Self {
            sort: SortOrder::Ascending,
            limit: None,
        }
    }
}

/// Durable document store, the single source of truth for pipeline
/// progress.
///
/// Implementations serialize writes per record: an `update` reads,
/// patches and writes one document without interleaving with another
/// write to the same id.
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Inserts `body`, stamping `id` and creation (and `updatedAt`) fields.
    /// Returns the stored document.
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError>;

    /// Applies `patch` to the document `id` and stamps `updatedAt`.
    /// Returns the stored document.
    async fn update(
        &self,
        collection: Collection,
        id: RecordId,
        patch: Patch<'_>,
    ) -> Result<Value, StoreError>;

    /// Fetches one document.
    async fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Value>, StoreError>;

    /// Every document in the collection, in insertion order.
    async fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Documents of `collection` matching `predicate`, ordered by creation
/// time and truncated per `options`.
///
/// # Errors
///
/// Propagates the backend's read error.
pub async fn find<P>(
    store: &dyn RecordStore,
    collection: Collection,
    predicate: P,
    options: FindOptions,
) -> Result<Vec<Value>, StoreError>
where
    P: Fn(&Value) -> bool + Send,
{
    let mut docs: Vec<Value> = store
        .all(collection)
        .await?
        .into_iter()
        .filter(|doc| predicate(doc))
        .collect();
    // Stable sort keeps insertion order among equal timestamps.
    docs.sort_by_key(|doc| created_at(collection, doc));
    if options.sort == SortOrder::Descending {
        docs.reverse();
    }
    if let Some(limit) = options.limit {
        docs.truncate(limit);
    }
    Ok(docs)
}

/// Parsed creation timestamp of a document.
#[must_use]
pub fn created_at(collection: Collection, doc: &Value) -> Option<DateTime<Utc>> {
    doc.get(collection.created_field())
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Parsed `id` field of a document.
#[must_use]
pub fn document_id(doc: &Value) -> Option<RecordId> {
    doc.get("id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn object_mut(collection: Collection, doc: &mut Value) -> Result<&mut Map<String, Value>, StoreError> {
    doc.as_object_mut().ok_or_else(|| {
        StoreError::Serialization(format!("{collection} documents must be JSON objects"))
    })
}

/// Stamps a new document with a fresh id and creation time.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] when `body` is not an object.
pub fn stamp_new(collection: Collection, mut body: Value) -> Result<(RecordId, Value), StoreError> {
    let id = RecordId::new();
    let now = Value::String(Utc::now().to_rfc3339());
    let obj = object_mut(collection, &mut body)?;
    obj.insert("id".to_string(), Value::String(id.to_string()));
    obj.insert(collection.created_field().to_string(), now.clone());
    if collection.tracks_updates() {
        obj.insert("updatedAt".to_string(), now);
    }
    Ok((id, body))
}

/// Runs `patch` on `doc`, then restores the id and stamps `updatedAt`.
///
/// # Errors
///
/// Returns whatever `patch` returns, or [`StoreError::Serialization`]
/// when the patched document is no longer an object.
pub fn apply_patch(
    collection: Collection,
    id: RecordId,
    doc: &mut Value,
    patch: Patch<'_>,
) -> Result<(), StoreError> {
    patch(doc)?;
    let obj = object_mut(collection, doc)?;
    obj.insert("id".to_string(), Value::String(id.to_string()));
    if collection.tracks_updates() {
        obj.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn collection_names_round_trip() {
        for c in Collection::ALL {
            assert_eq!(c.as_str().parse::<Collection>().ok(), Some(c));
        }
        assert!("wallets".parse::<Collection>().is_err());
    }

    #[test]
    fn stamping_respects_collection_fields() {
        let Ok((id, burn)) = stamp_new(Collection::Burns, json!({ "amount": 5 })) else {
            panic!("object bodies stamp");
        };
        assert_eq!(document_id(&burn), Some(id));
        assert!(burn.get("timestamp").is_some());
        assert!(burn.get("updatedAt").is_none());

        let Ok((_, reward)) = stamp_new(Collection::Rewards, json!({})) else {
            panic!("object bodies stamp");
        };
        assert!(reward.get("createdAt").is_some());
        assert!(reward.get("updatedAt").is_some());
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(matches!(
            stamp_new(Collection::Metrics, json!([1, 2])),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn patch_cannot_change_id() {
        let Ok((id, mut doc)) = stamp_new(Collection::Milestones, json!({ "completed": false }))
        else {
            panic!("object bodies stamp");
        };
        let patch = |d: &mut Value| {
            if let Some(obj) = d.as_object_mut() {
                obj.insert("id".into(), json!("hijacked"));
                obj.insert("completed".into(), json!(true));
            }
            Ok(())
        };
        assert!(apply_patch(Collection::Milestones, id, &mut doc, &patch).is_ok());
        assert_eq!(document_id(&doc), Some(id));
        assert_eq!(doc.get("completed"), Some(&json!(true)));
    }
}
