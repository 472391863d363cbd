//! crates/carelink_core/src/memory.rs
//!
//! In-process implementations of the storage ports. Used by the test suites and by
//! the API when it runs with `STORE_BACKEND=memory`.

use crate::fields::{FieldValue, Fields};
use crate::ports::{DocumentStore, PortError, PortResult, SecretStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// A document store held in memory.
///
/// Every successful write is counted, and a write budget can be set so that the
/// store starts failing after a given number of further writes.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<Collections>,
    writes: AtomicUsize,
    write_budget: Mutex<Option<usize>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that reached the store so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Allow `remaining` more writes, then fail every write with `PortError::Unexpected`.
    pub fn fail_writes_after(&self, remaining: usize) {
        *self.lock_budget() = Some(remaining);
    }

    pub fn clear_write_failures(&self) {
        *self.lock_budget() = None;
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values().all(|docs| docs.is_empty())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        // A poisoned lock only means a test panicked mid-write; the data is still usable.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_budget(&self) -> std::sync::MutexGuard<'_, Option<usize>> {
        self.write_budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_write(&self, collection: &str, id: &str) -> PortResult<()> {
        let mut budget = self.lock_budget();
        match budget.as_mut() {
            Some(0) => Err(PortError::Unexpected(format!(
                "injected write failure on {}/{}",
                collection, id
            ))),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn commit_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn with_document<F>(&self, collection: &str, id: &str, f: F) -> PortResult<()>
    where
        F: FnOnce(&mut Fields) -> PortResult<()>,
    {
        self.begin_write(collection, id)?;
        let mut collections = self.lock();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))?;
        f(doc)?;
        self.commit_write();
        Ok(())
    }
}

fn string_array_mut<'a>(doc: &'a mut Fields, field: &str) -> PortResult<&'a mut Vec<String>> {
    let entry = doc
        .entry(field.to_string())
        .or_insert_with(|| FieldValue::StringArrayValue(Vec::new()));
    match entry {
        FieldValue::StringArrayValue(values) => Ok(values),
        other => Err(PortError::Unexpected(format!(
            "field '{}' is {}, not a string-array",
            field,
            other.type_name()
        ))),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> PortResult<Fields> {
        self.lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn upsert_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        self.begin_write(collection, id)?;
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.commit_write();
        Ok(())
    }

    async fn patch_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        self.with_document(collection, id, |doc| {
            doc.extend(fields);
            Ok(())
        })
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        guard_field: &str,
        guard_value: &FieldValue,
    ) -> PortResult<()> {
        self.with_document(collection, id, |doc| {
            if doc.get(guard_field) != Some(guard_value) {
                return Err(PortError::Conflict(format!(
                    "{}/{}: '{}' changed",
                    collection, id, guard_field
                )));
            }
            doc.extend(fields);
            Ok(())
        })
    }

    async fn delete_document(&self, collection: &str, id: &str) -> PortResult<bool> {
        self.begin_write(collection, id)?;
        let removed = self
            .lock()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        self.commit_write();
        Ok(removed)
    }

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> PortResult<Vec<(String, Fields)>> {
        Ok(self
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| doc.get(field) == Some(value))
                    .map(|(id, doc)| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()> {
        self.with_document(collection, id, |doc| {
            let array = string_array_mut(doc, field)?;
            for value in values {
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
            Ok(())
        })
    }

    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()> {
        self.with_document(collection, id, |doc| {
            let array = string_array_mut(doc, field)?;
            array.retain(|v| !values.contains(v));
            Ok(())
        })
    }
}

/// A secret store held in memory.
#[derive(Default)]
pub struct InMemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::fields;

    #[tokio::test]
    async fn array_union_skips_existing_values() {
        let store = InMemoryDocumentStore::new();
        store
            .upsert_document("users", "a", fields([("caretakersID", vec!["b".to_string()].into())]))
            .await
            .unwrap();
        store
            .array_union("users", "a", "caretakersID", &["b".into(), "c".into()])
            .await
            .unwrap();
        let doc = store.get_document("users", "a").await.unwrap();
        assert_eq!(
            doc["caretakersID"],
            FieldValue::from(vec!["b".to_string(), "c".to_string()])
        );
    }

    #[tokio::test]
    async fn update_if_rejects_stale_guard_without_writing() {
        let store = InMemoryDocumentStore::new();
        store
            .upsert_document("inv", "1", fields([("version", 1_i64.into())]))
            .await
            .unwrap();
        let before = store.write_count();

        let err = store
            .update_if("inv", "1", fields([("status", "accepted".into())]), "version", &0_i64.into())
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::Conflict(_)));
        assert_eq!(store.write_count(), before);
        assert!(!store.get_document("inv", "1").await.unwrap().contains_key("status"));
    }

    #[tokio::test]
    async fn write_budget_fails_later_writes() {
        let store = InMemoryDocumentStore::new();
        store.fail_writes_after(1);
        store.upsert_document("c", "1", Fields::new()).await.unwrap();
        let err = store.upsert_document("c", "2", Fields::new()).await.unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
        assert_eq!(store.len("c"), 1);

        store.clear_write_failures();
        store.upsert_document("c", "2", Fields::new()).await.unwrap();
        assert_eq!(store.len("c"), 2);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.get_document("users", "ghost").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        let err = store
            .array_remove("users", "ghost", "caregiversID", &["x".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
