//! Per-namespace key/value metadata persisted next to shipyard's state.
//!
//! Values live in memory once loaded; [`MetaStore::persist`] merges the
//! keys set locally into `<data_dir>/meta/<namespace>.json` and
//! [`MetaStore::clean`] drops both copies. Writers of the same namespace
//! are serialized by a process wide async lock.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shipyard_common::error::ShipyardError;
use shipyard_common::types::Namespace;

type NamespaceLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

fn namespace_lock(namespace: &Namespace) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<NamespaceLocks> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(namespace.as_str().to_string()).or_default())
}

/// On-disk meta record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// Namespace the record belongs to.
    pub namespace: String,
    /// Last write time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Stored values.
    #[serde(default)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Cache {
    /// Values as last loaded or persisted, plus local sets.
    values: Option<Map<String, Value>>,
    /// Keys set since the last persist or clean.
    pending: Map<String, Value>,
}

/// Lazily loaded metadata of one manifest namespace.
#[derive(Debug)]
pub struct MetaStore {
    namespace: Namespace,
    file: PathBuf,
    cache: Mutex<Cache>,
}

impl MetaStore {
    /// Creates a store for `namespace` under `meta_dir`. Nothing is read
    /// until the first access.
    #[must_use]
    pub fn new(meta_dir: &Path, namespace: Namespace) -> Self {
        Self {
            file: meta_dir.join(format!("{namespace}.json")),
            namespace,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Path of the backing record.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_record(file: &Path) -> Result<Option<MetaRecord>, ShipyardError> {
        match std::fs::read_to_string(file) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShipyardError::io(file, e)),
        }
    }

    async fn read_record_async(&self) -> Result<MetaRecord, ShipyardError> {
        match tokio::fs::read_to_string(&self.file).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(MetaRecord::default()),
            Err(e) => Err(ShipyardError::io(&self.file, e)),
        }
    }

    fn with_values<T>(
        &self,
        f: impl FnOnce(&mut Map<String, Value>, &mut Map<String, Value>) -> T,
    ) -> Result<T, ShipyardError> {
        let mut guard = self.cache();
        let cache = &mut *guard;
        if cache.values.is_none() {
            let loaded = Self::read_record(&self.file)?.map(|r| r.values).unwrap_or_default();
            tracing::debug!(namespace = %self.namespace, keys = loaded.len(), "loaded meta");
            cache.values = Some(loaded);
        }
        let values = cache.values.get_or_insert_with(Map::new);
        Ok(f(values, &mut cache.pending))
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the backing record exists but cannot be read or parsed.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ShipyardError> {
        self.with_values(|values, _| values.get(key).cloned())
    }

    /// Stores `value` under `key` in memory. Call [`MetaStore::persist`] to
    /// write it out.
    ///
    /// # Errors
    ///
    /// Fails when the backing record exists but cannot be read or parsed.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<(), ShipyardError> {
        let key = key.into();
        self.with_values(|values, pending| {
            let _ = values.insert(key.clone(), value.clone());
            let _ = pending.insert(key, value);
        })
    }

    /// Writes the keys set since the last persist or clean over the stored
    /// record, then reloads memory from what was written.
    ///
    /// Keys other holders wrote are kept; keys another holder cleaned are
    /// not brought back unless this store set them again.
    ///
    /// # Errors
    ///
    /// Fails on I/O or serialization errors. Pending keys are kept for the
    /// next attempt.
    pub async fn persist(&self) -> Result<(), ShipyardError> {
        let lock = namespace_lock(&self.namespace);
        let _guard = lock.lock().await;

        let mut record = self.read_record_async().await?;
        let written = self.cache().pending.clone();
        record.namespace = self.namespace.to_string();
        record.updated_at = Some(Utc::now());
        record.values.extend(written.clone());

        if let Some(dir) = self.file.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ShipyardError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&self.file, json)
            .await
            .map_err(|e| ShipyardError::io(&self.file, e))?;

        let mut cache = self.cache();
        cache.pending.retain(|key, value| written.get(key) != Some(&*value));
        let mut values = record.values;
        values.extend(cache.pending.clone());
        tracing::debug!(namespace = %self.namespace, keys = values.len(), "persisted meta");
        cache.values = Some(values);
        Ok(())
    }

    /// Removes the backing record, then clears the in-memory values.
    ///
    /// # Errors
    ///
    /// Fails when the record exists but cannot be removed; memory is left
    /// untouched in that case.
    pub async fn clean(&self) -> Result<(), ShipyardError> {
        let lock = namespace_lock(&self.namespace);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(&self.file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ShipyardError::io(&self.file, e)),
        }
        *self.cache() = Cache {
            values: Some(Map::new()),
            pending: Map::new(),
        };
        tracing::debug!(namespace = %self.namespace, "cleaned meta");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store(dir: &Path) -> MetaStore {
        MetaStore::new(&dir.join("meta"), Namespace::from_path(Path::new("/p/Shipfile")))
    }

    #[test]
    fn missing_record_reads_as_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert_eq!(store(tmp.path()).get("anything").expect("get"), None);
    }

    #[test]
    fn set_is_visible_before_persist() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let meta = store(tmp.path());
        meta.set("ip", json!("10.0.0.2")).expect("set");
        assert_eq!(meta.get("ip").expect("get"), Some(json!("10.0.0.2")));
        assert!(!meta.file().exists());
    }

    #[tokio::test]
    async fn persist_then_reload() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let meta = store(tmp.path());
        meta.set("ports", json!({ "http": 49153 })).expect("set");
        meta.persist().await.expect("persist");

        let reloaded = store(tmp.path());
        assert_eq!(reloaded.get("ports").expect("get"), Some(json!({ "http": 49153 })));
    }

    #[tokio::test]
    async fn persist_merges_with_stored_values() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let first = store(tmp.path());
        first.set("a", json!(1)).expect("set");
        first.persist().await.expect("persist");

        let second = store(tmp.path());
        second.set("b", json!(2)).expect("set");
        second.persist().await.expect("persist");

        let text = std::fs::read_to_string(second.file()).expect("read");
        let record: MetaRecord = serde_json::from_str(&text).expect("parse");
        assert_eq!(record.values.get("a"), Some(&json!(1)));
        assert_eq!(record.values.get("b"), Some(&json!(2)));
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn clean_removes_memory_and_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let meta = store(tmp.path());
        meta.set("key", json!("value")).expect("set");
        meta.persist().await.expect("persist");
        meta.clean().await.expect("clean");
        assert_eq!(meta.get("key").expect("get"), None);
        assert!(!meta.file().exists());
        meta.clean().await.expect("cleaning twice is fine");
    }

    #[tokio::test]
    async fn failed_clean_keeps_memory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let meta = store(tmp.path());
        meta.set("key", json!("value")).expect("set");
        std::fs::create_dir_all(meta.file()).expect("directory in place of the record");

        assert!(meta.clean().await.is_err());
        assert_eq!(meta.get("key").expect("get"), Some(json!("value")));
        assert!(meta.file().is_dir());
    }

    #[tokio::test]
    async fn persist_does_not_restore_keys_cleaned_elsewhere() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = store(tmp.path());
        let b = store(tmp.path());
        a.set("k", json!("old")).expect("set");
        a.persist().await.expect("persist");

        b.clean().await.expect("clean");
        a.set("other", json!(1)).expect("set");
        a.persist().await.expect("persist");

        let fresh = store(tmp.path());
        assert_eq!(fresh.get("k").expect("get"), None);
        assert_eq!(fresh.get("other").expect("get"), Some(json!(1)));
        assert_eq!(a.get("k").expect("get"), None);
    }

    #[tokio::test]
    async fn persist_refreshes_memory_with_other_writers() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = store(tmp.path());
        let b = store(tmp.path());
        a.set("a", json!(1)).expect("set");
        b.set("b", json!(2)).expect("set");
        b.persist().await.expect("persist");
        a.persist().await.expect("persist");

        assert_eq!(a.get("b").expect("get"), Some(json!(2)));
        a.persist().await.expect("nothing pending");
        assert_eq!(store(tmp.path()).get("a").expect("get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn persist_failure_keeps_pending_keys() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let meta = store(tmp.path());
        meta.set("k", json!(true)).expect("set");
        let blocker = tmp.path().join("meta");
        std::fs::write(&blocker, "not a directory").expect("block meta dir");
        assert!(meta.persist().await.is_err());

        std::fs::remove_file(&blocker).expect("unblock");
        meta.persist().await.expect("persist");
        assert_eq!(store(tmp.path()).get("k").expect("get"), Some(json!(true)));
    }
}
