//! JSON-file record store.
//!
//! Each collection is one file `<dir>/<collection>.json` holding a JSON
//! array of documents. Writes go to a temporary sibling that is renamed
//! over the original, so a crash never leaves a half-written file. A file
//! that fails to parse is copied to `<file>.corrupt-<timestamp>` and
//! reported as [`StoreError::Corrupted`]; it is never overwritten.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Collection, Patch, RecordStore, StoreError, apply_patch, document_id, stamp_new};
use crate::domain::RecordId;

/// Store backed by one JSON file per collection.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // Serializes every read-modify-write cycle across collections.
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "file record store opened");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Directory holding the collection files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `collection`.
    #[must_use]
    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }

    async fn load(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let path = self.path_for(collection);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Vec<Value>>(&raw) {
            Ok(docs) => Ok(docs),
            Err(e) => {
                let backup = self.back_up(&path).await;
                tracing::error!(
                    collection = %collection,
                    path = %path.display(),
                    backup = ?backup,
                    error = %e,
                    "record store file is corrupted"
                );
                Err(StoreError::Corrupted {
                    collection,
                    reason: e.to_string(),
                    backup,
                })
            }
        }
    }

    async fn back_up(&self, path: &Path) -> Option<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut name = path.file_name()?.to_os_string();
        name.push(format!(".corrupt-{stamp}"));
        let backup = path.with_file_name(name);
        match tokio::fs::copy(path, &backup).await {
            Ok(_) => Some(backup),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to back up corrupt file");
                None
            }
        }
    }

    async fn save(&self, collection: Collection, docs: &[Value]) -> Result<(), StoreError> {
        let path = self.path_for(collection);
        let bytes = serde_json::to_vec_pretty(docs)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn create(&self, collection: Collection, body: Value) -> Result<Value, StoreError> {
        let (_, doc) = stamp_new(collection, body)?;
        let _guard = self.lock.lock().await;
        let mut docs = self.load(collection).await?;
        docs.push(doc.clone());
        self.save(collection, &docs).await?;
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: RecordId,
        patch: Patch<'_>,
    ) -> Result<Value, StoreError> {
        let _guard = self.lock.lock().await;
        let mut docs = self.load(collection).await?;
        let slot = docs
            .iter_mut()
            .find(|d| document_id(d) == Some(id))
            .ok_or(StoreError::NotFound { collection, id })?;
        let mut doc = slot.clone();
        apply_patch(collection, id, &mut doc, patch)?;
        *slot = doc.clone();
        self.save(collection, &docs).await?;
        Ok(doc)
    }

    async fn get(&self, collection: Collection, id: RecordId) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load(collection)
            .await?
            .into_iter()
            .find(|d| document_id(d) == Some(id)))
    }

    async fn all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(collection).await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reward-burner-{tag}-{}", RecordId::new()))
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = scratch_dir("reopen");
        let Ok(store) = FileStore::open(&dir).await else {
            panic!("store should open");
        };
        let Ok(doc) = store
            .create(Collection::Milestones, json!({ "label": "1M", "completed": false }))
            .await
        else {
            panic!("create should succeed");
        };
        drop(store);

        let Ok(reopened) = FileStore::open(&dir).await else {
            panic!("store should reopen");
        };
        let Ok(all) = reopened.all(Collection::Milestones).await else {
            panic!("read should succeed");
        };
        assert_eq!(all, vec![doc]);
        assert!(!reopened.path_for(Collection::Milestones).with_extension("json.tmp").exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_backed_up_and_left_alone() {
        let dir = scratch_dir("corrupt");
        let Ok(store) = FileStore::open(&dir).await else {
            panic!("store should open");
        };
        let path = store.path_for(Collection::Rewards);
        assert!(tokio::fs::write(&path, b"[{\"id\": ").await.is_ok());

        let result = store.create(Collection::Rewards, json!({})).await;
        let Err(StoreError::Corrupted {
            collection,
            backup: Some(backup),
            ..
        }) = result
        else {
            panic!("expected corruption with backup");
        };
        assert_eq!(collection, Collection::Rewards);
        assert!(backup.exists());
        let Ok(original) = tokio::fs::read(&path).await else {
            panic!("original must remain");
        };
        assert_eq!(original, b"[{\"id\": ");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_and_empty_files_read_as_empty() {
        let dir = scratch_dir("empty");
        let Ok(store) = FileStore::open(&dir).await else {
            panic!("store should open");
        };
        assert!(matches!(store.all(Collection::Burns).await, Ok(v) if v.is_empty()));
        assert!(tokio::fs::write(store.path_for(Collection::Burns), b"\n").await.is_ok());
        assert!(matches!(store.all(Collection::Burns).await, Ok(v) if v.is_empty()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
