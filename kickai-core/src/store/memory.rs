//! In-memory [`Store`] implementation for tests and offline CLI operation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{Document, Filter, Store, StoreError, apply_filters};

/// Thread-safe in-memory document store, keyed by collection then id.
///
/// Recovers from a poisoned lock the same way the rest of the corpus does:
/// a panic while holding the lock should not wedge every other caller.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert documents directly, bypassing id generation. Used by tests and
    /// by `kickai-cli`'s local/offline mode to pre-populate fixture data.
    pub fn seed(&self, collection: &str, id: impl Into<String>, data: Value) {
        let mut guard = self.lock();
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), data);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashMap<String, Value>>> {
        match self.collections.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
        id: Option<String>,
    ) -> Result<String, StoreError> {
        let id = id.unwrap_or_else(|| Uuid::now_v7().to_string());
        let mut guard = self.lock();
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let guard = self.lock();
        Ok(guard
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let existing = guard
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;

        merge_json(existing, &patch);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.lock();
        Ok(guard
            .get_mut(collection)
            .map(|c| c.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn query_documents(
        &self,
        collection: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.lock();
        let docs = guard
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(apply_filters(docs, filters, limit))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.lock();
        Ok(guard.keys().cloned().collect())
    }
}

/// Merge `patch`'s top-level keys into `existing`, preserving keys not
/// present in `patch` and overwriting ones that are (§6: "writes must
/// preserve unknown keys").
fn merge_json(existing: &mut Value, patch: &Value) {
    if let (Value::Object(existing_map), Value::Object(patch_map)) = (existing, patch) {
        for (k, v) in patch_map {
            existing_map.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        let id = store
            .create_document("kickai_teams", json!({"name": "Test"}), None)
            .await
            .unwrap();
        let doc = store.get_document("kickai_teams", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Test");
    }

    #[tokio::test]
    async fn explicit_id_is_honored() {
        let store = MemoryStore::new();
        let id = store
            .create_document("kickai_teams", json!({"name": "Test"}), Some("KTI".into()))
            .await
            .unwrap();
        assert_eq!(id, "KTI");
    }

    #[tokio::test]
    async fn update_preserves_unknown_keys() {
        let store = MemoryStore::new();
        let id = store
            .create_document("c", json!({"a": 1, "b": 2}), None)
            .await
            .unwrap();
        store
            .update_document("c", &id, json!({"a": 99}))
            .await
            .unwrap();
        let doc = store.get_document("c", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["a"], 99);
        assert_eq!(doc.data["b"], 2);
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_document("c", "missing", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_reports_whether_it_existed() {
        let store = MemoryStore::new();
        let id = store.create_document("c", json!({}), None).await.unwrap();
        assert!(store.delete_document("c", &id).await.unwrap());
        assert!(!store.delete_document("c", &id).await.unwrap());
    }

    #[tokio::test]
    async fn query_conjoins_filters() {
        let store = MemoryStore::new();
        store
            .create_document("c", json!({"team_id": "KTI", "phone": "+44"}), None)
            .await
            .unwrap();
        store
            .create_document("c", json!({"team_id": "KTI", "phone": "+49"}), None)
            .await
            .unwrap();
        store
            .create_document("c", json!({"team_id": "OTHER", "phone": "+44"}), None)
            .await
            .unwrap();

        let results = store
            .query_documents(
                "c",
                &[
                    Filter::eq("team_id", json!("KTI")),
                    Filter::eq("phone", json!("+44")),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .create_document("c", json!({"n": i}), None)
                .await
                .unwrap();
        }
        let results = store.query_documents("c", &[], Some(2)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn list_collections_reports_seeded_names() {
        let store = MemoryStore::new();
        store.seed("kickai_teams", "KTI", json!({}));
        store.seed("kickai_KTI_players", "p1", json!({}));
        let mut cols = store.list_collections().await.unwrap();
        cols.sort();
        assert_eq!(cols, vec!["kickai_KTI_players", "kickai_teams"]);
    }
}
