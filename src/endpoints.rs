//! Persisted list of control endpoints.
//!
//! The list is stored as one JSON array under [`ENDPOINTS_KEY`] in a
//! [`KeyValueStore`]. Loading never fails: a missing or unreadable list
//! falls back to the local endpoint.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rdwatch_types::{Endpoint, ENDPOINTS_KEY};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Load-all / save-all storage of JSON values by key.
pub trait KeyValueStore: Send + Sync {
    /// The stored value, `None` if nothing was saved under `key`.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value under `key`.
    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "Saved {}", key);
        Ok(())
    }
}

/// In-memory store, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// The endpoint list with at most one active entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::local()],
        }
    }
}

impl EndpointRegistry {
    /// Wrap a list, keeping only the first active flag if several are set.
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        let mut seen_active = false;
        for endpoint in &mut endpoints {
            if endpoint.is_active && seen_active {
                endpoint.is_active = false;
            }
            seen_active |= endpoint.is_active;
        }
        Self { endpoints }
    }

    /// Load the list from `store`, or the default list if there is none or
    /// it does not decode.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let value = match store.load(ENDPOINTS_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return Self::default(),
            Err(e) => {
                warn!(error = %e, "Could not read endpoint list, using default");
                return Self::default();
            }
        };
        match serde_json::from_value::<Vec<Endpoint>>(value) {
            Ok(endpoints) if !endpoints.is_empty() => Self::new(endpoints),
            Ok(_) => Self::default(),
            Err(e) => {
                warn!(error = %e, "Stored endpoint list is invalid, using default");
                Self::default()
            }
        }
    }

    /// Persist the whole list.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.save(ENDPOINTS_KEY, &serde_json::to_value(&self.endpoints)?)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    /// The endpoint in focus.
    pub fn active(&self) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.is_active)
    }

    /// Urls of every endpoint, in list order.
    pub fn urls(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.url.clone()).collect()
    }

    /// Add an inactive endpoint and return its generated id.
    pub fn add(&mut self, name: impl Into<String>, url: impl Into<String>) -> String {
        let id = self.fresh_id();
        self.endpoints.push(Endpoint::new(id.clone(), name, url));
        id
    }

    /// Change name and url of an existing endpoint.
    pub fn update(
        &mut self,
        id: &str,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<(), StoreError> {
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::UnknownEndpoint(id.to_string()))?;
        endpoint.name = name.into();
        endpoint.url = url.into();
        Ok(())
    }

    /// Remove an endpoint, returning it.
    pub fn remove(&mut self, id: &str) -> Result<Endpoint, StoreError> {
        let index = self
            .endpoints
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StoreError::UnknownEndpoint(id.to_string()))?;
        Ok(self.endpoints.remove(index))
    }

    /// Make `id` the only active endpoint.
    pub fn set_active(&mut self, id: &str) -> Result<(), StoreError> {
        if self.get(id).is_none() {
            return Err(StoreError::UnknownEndpoint(id.to_string()));
        }
        for endpoint in &mut self.endpoints {
            endpoint.is_active = endpoint.id == id;
        }
        Ok(())
    }

    fn fresh_id(&self) -> String {
        let base = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .to_string();
        let mut id = base.clone();
        let mut n = 1;
        while self.get(&id).is_some() {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_when_store_empty() {
        let registry = EndpointRegistry::load(&MemoryStore::new());
        assert_eq!(registry.endpoints(), &[Endpoint::local()]);
        assert_eq!(registry.active().unwrap().id, "local");
    }

    #[test]
    fn test_default_when_store_corrupt() {
        let store = MemoryStore::new();
        store.save(ENDPOINTS_KEY, &json!({"not": "a list"})).unwrap();
        assert_eq!(EndpointRegistry::load(&store), EndpointRegistry::default());

        store.save(ENDPOINTS_KEY, &json!([])).unwrap();
        assert_eq!(EndpointRegistry::load(&store), EndpointRegistry::default());
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let mut registry = EndpointRegistry::default();
        let id = registry.add("Router", "http://192.168.1.1:8030");
        registry.save(&store).unwrap();

        let loaded = EndpointRegistry::load(&store);
        assert_eq!(loaded, registry);
        assert_eq!(loaded.get(&id).unwrap().name, "Router");
        assert_eq!(
            store.load(ENDPOINTS_KEY).unwrap().unwrap()[1]["isActive"],
            json!(false)
        );
    }

    #[test]
    fn test_single_active() {
        let mut registry = EndpointRegistry::default();
        let id = registry.add("Remote", "http://10.0.0.2:8030");

        registry.set_active(&id).unwrap();
        assert_eq!(registry.active().unwrap().id, id);
        assert_eq!(registry.endpoints().iter().filter(|e| e.is_active).count(), 1);

        assert!(matches!(
            registry.set_active("missing"),
            Err(StoreError::UnknownEndpoint(_))
        ));
        assert_eq!(registry.active().unwrap().id, id);
    }

    #[test]
    fn test_new_clears_extra_active_flags() {
        let mut a = Endpoint::new("a", "A", "http://a");
        let mut b = Endpoint::new("b", "B", "http://b");
        a.is_active = true;
        b.is_active = true;
        let registry = EndpointRegistry::new(vec![a, b]);
        assert_eq!(registry.active().unwrap().id, "a");
        assert!(!registry.get("b").unwrap().is_active);
    }

    #[test]
    fn test_update_and_remove() {
        let mut registry = EndpointRegistry::default();
        registry.update("local", "Laptop", "http://127.0.0.1:9000").unwrap();
        assert_eq!(registry.urls(), vec!["http://127.0.0.1:9000"]);

        let removed = registry.remove("local").unwrap();
        assert_eq!(removed.name, "Laptop");
        assert!(registry.endpoints().is_empty());
        assert!(registry.remove("local").is_err());
        assert!(registry.update("local", "x", "y").is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut registry = EndpointRegistry::default();
        let first = registry.add("one", "http://one");
        let second = registry.add("two", "http://two");
        assert_ne!(first, second);
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert!(store.load(ENDPOINTS_KEY).unwrap().is_none());
        store.save(ENDPOINTS_KEY, &json!([1, 2])).unwrap();
        assert_eq!(store.load(ENDPOINTS_KEY).unwrap(), Some(json!([1, 2])));
        assert!(dir.path().join("state/rdp-instances.json").exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rdp-instances.json"), "{truncated").unwrap();
        let store = FileStore::new(dir.path());

        assert!(matches!(store.load(ENDPOINTS_KEY), Err(StoreError::Json(_))));
        assert_eq!(EndpointRegistry::load(&store), EndpointRegistry::default());
    }
}
