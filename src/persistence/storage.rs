use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Host-provided durable key/value capability. Synchronous by contract; the
/// runner serializes its own read-modify-write cycles, and concurrent
/// writers outside the process are outside the consistency guarantee.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory storage, for tests and hosts that opt out of durability.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.map.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }
}

/// File-backed storage keeping all keys in one JSON blob, read-modify-write
/// per operation. Single-process consistency only.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
                warn!(%error, path = %self.path.display(), "corrupt storage blob, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, map: &HashMap<String, String>) {
        match serde_json::to_string(map) {
            Ok(raw) => {
                if let Err(error) = std::fs::write(&self.path, raw) {
                    warn!(%error, path = %self.path.display(), "failed to write storage blob");
                }
            }
            Err(error) => warn!(%error, "failed to encode storage blob"),
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.load().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let _guard = self.lock.lock();
        let mut map = self.load();
        map.insert(key.to_string(), value);
        self.save(&map);
    }

    fn remove(&self, key: &str) {
        let _guard = self.lock.lock();
        let mut map = self.load();
        map.remove(key);
        self.save(&map);
    }
}
