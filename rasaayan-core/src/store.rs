//! History and inventory persistence.
//!
//! Two JSON documents live in a key-value backend: the simulation history
//! (newest first, bounded) and the list of synthesized molecules. Both are
//! loaded once when the store opens and rewritten in full after every
//! mutation. There is no transaction spanning the two keys.

use crate::error::StoreError;
use crate::library::Inventory;
use crate::types::{HistoryItem, Molecule, ReactionInput, ReactionSimulationResult};
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const HISTORY_KEY: &str = "history.json";
pub const SYNTHESIZED_KEY: &str = "synthesized.json";

/// Default number of history entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// String-keyed document storage.
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
///
/// Writes go to a `.tmp` sibling that is then renamed over the target, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Read {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(&self.dir)?;
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, value)?;
            std::fs::rename(&tmp, &path)
        };
        write().map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), bytes = value.len(), "Persisted document");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Write {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// In-process store for tests and `--offline` sessions without a data dir.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key, e.g. with a corrupt document.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|e| StoreError::Read {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|e| StoreError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        entries.remove(key);
        Ok(())
    }
}

/// Nine uppercase base-36 characters.
pub fn generate_history_id() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Bounded simulation log, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLog {
    items: Vec<HistoryItem>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    /// Adopt previously persisted entries, dropping any beyond capacity.
    pub fn from_items(mut items: Vec<HistoryItem>, capacity: usize) -> Self {
        items.truncate(capacity);
        Self { items, capacity }
    }

    /// Insert at the front, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, item: HistoryItem) {
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|i| i.id.eq_ignore_ascii_case(id))
    }

    pub fn latest(&self) -> Option<&HistoryItem> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Loads a JSON list under `key`; a missing or unreadable document is
/// treated as empty.
fn load_list<T: serde::de::DeserializeOwned>(backend: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let text = match backend.get(key) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key, error = %e, "Could not read stored document, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&text) {
        Ok(items) => items,
        Err(e) => {
            warn!(key, error = %e, "Stored document is corrupt, starting empty");
            Vec::new()
        }
    }
}

/// History log and inventory bound to a persistence backend.
pub struct LabStore {
    backend: Box<dyn KeyValueStore>,
    history: HistoryLog,
    inventory: Inventory,
}

impl LabStore {
    /// Load both documents from `backend`.
    pub fn open(backend: Box<dyn KeyValueStore>, history_capacity: usize) -> Self {
        let history = HistoryLog::from_items(
            load_list(backend.as_ref(), HISTORY_KEY),
            history_capacity,
        );
        let inventory = Inventory::with_synthesized(load_list(backend.as_ref(), SYNTHESIZED_KEY));
        debug!(
            history = history.len(),
            synthesized = inventory.synthesized().len(),
            "Opened lab store"
        );
        Self {
            backend,
            history,
            inventory,
        }
    }

    /// File-backed store under `dir`.
    pub fn open_dir(dir: impl Into<PathBuf>, history_capacity: usize) -> Self {
        Self::open(Box::new(FileStore::new(dir)), history_capacity)
    }

    /// Non-persistent store.
    pub fn in_memory(history_capacity: usize) -> Self {
        Self::open(Box::new(MemoryStore::new()), history_capacity)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Record a completed simulation and persist the log.
    ///
    /// The entry stays in memory even if the write fails; the error is
    /// returned so the caller can report it.
    pub fn record(
        &mut self,
        input: ReactionInput,
        result: ReactionSimulationResult,
    ) -> Result<HistoryItem, StoreError> {
        let item = HistoryItem {
            id: generate_history_id(),
            timestamp: Utc::now(),
            input,
            result,
        };
        self.history.push(item.clone());
        self.persist_history()?;
        Ok(item)
    }

    pub fn clear_history(&mut self) -> Result<(), StoreError> {
        self.history.clear();
        self.persist_history()
    }

    /// Add a discovered molecule to the `Synthesized` shelf and persist it.
    /// Returns `Ok(false)` for a duplicate, without writing.
    pub fn add_synthesized(&mut self, molecule: Molecule) -> Result<bool, StoreError> {
        if !self.inventory.add_synthesized(molecule) {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(self.inventory.synthesized()).map_err(|e| {
            StoreError::Write {
                key: SYNTHESIZED_KEY.to_string(),
                message: e.to_string(),
            }
        })?;
        self.backend.put(SYNTHESIZED_KEY, &json)?;
        Ok(true)
    }

    fn persist_history(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self.history.items()).map_err(|e| {
            StoreError::Write {
                key: HISTORY_KEY.to_string(),
                message: e.to_string(),
            }
        })?;
        self.backend.put(HISTORY_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnergyTrend;
    use tempfile::TempDir;

    fn sample_input(tag: &str) -> ReactionInput {
        ReactionInput {
            reactants: vec![Molecule::new("CCO").with_cid(702).with_name("Ethanol")],
            catalysts: String::new(),
            temperature: 25.0,
            pressure: 1.0,
            description: tag.to_string(),
        }
    }

    fn sample_result() -> ReactionSimulationResult {
        ReactionSimulationResult {
            products: vec![],
            byproducts: vec![],
            intermediates: None,
            feasibility_score: 50.0,
            energy_trend: EnergyTrend::Neutral,
            mechanism_insight: "n/a".into(),
            approx_time_required: "1 h".into(),
            alternative_route: "none".into(),
            safety_assessment: vec![],
            condition_warnings: None,
            ml_accuracy: None,
        }
    }

    fn item(id: &str) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            timestamp: Utc::now(),
            input: sample_input(id),
            result: sample_result(),
        }
    }

    #[test]
    fn test_history_id_format() {
        for _ in 0..50 {
            let id = generate_history_id();
            assert_eq!(id.len(), 9);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
            );
        }
    }

    #[test]
    fn test_history_push_front_and_evict() {
        let mut log = HistoryLog::new(3);
        for id in ["A", "B", "C", "D"] {
            log.push(item(id));
        }
        let ids: Vec<&str> = log.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["D", "C", "B"]);
        assert_eq!(log.latest().unwrap().id, "D");
        assert!(log.get("a").is_none());
        assert!(log.get("c").is_some());
    }

    #[test]
    fn test_history_from_items_truncates() {
        let items = (0..25).map(|i| item(&i.to_string())).collect();
        let log = HistoryLog::from_items(items, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(log.len(), 20);
        assert_eq!(log.items()[0].id, "0");
    }

    #[test]
    fn test_file_store_roundtrip_and_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get("k.json").unwrap(), None);

        store.put("k.json", "[1,2]").unwrap();
        assert_eq!(store.get("k.json").unwrap().as_deref(), Some("[1,2]"));
        assert!(!dir.path().join("nested").join("k.tmp").exists());

        store.remove("k.json").unwrap();
        store.remove("k.json").unwrap();
        assert_eq!(store.get("k.json").unwrap(), None);
    }

    #[test]
    fn test_lab_store_record_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = LabStore::open_dir(dir.path(), 20);
        let recorded = store.record(sample_input("first"), sample_result()).unwrap();

        let reopened = LabStore::open_dir(dir.path(), 20);
        assert_eq!(reopened.history().len(), 1);
        assert_eq!(reopened.history().items()[0], recorded);
    }

    #[test]
    fn test_lab_store_corrupt_history_starts_empty() {
        let backend = MemoryStore::new()
            .with_entry(HISTORY_KEY, "{not json")
            .with_entry(SYNTHESIZED_KEY, r#"[{"smiles": "CCOC(C)=O", "name": "Ethyl acetate"}]"#);
        let store = LabStore::open(Box::new(backend), 20);
        assert!(store.history().is_empty());
        assert_eq!(store.inventory().synthesized().len(), 1);
    }

    #[test]
    fn test_lab_store_add_synthesized() {
        let dir = TempDir::new().unwrap();
        let mut store = LabStore::open_dir(dir.path(), 20);
        let ester = Molecule::new("CCOC(C)=O").with_name("Ethyl acetate");
        assert!(store.add_synthesized(ester.clone()).unwrap());
        assert!(!store.add_synthesized(ester).unwrap());

        let reopened = LabStore::open_dir(dir.path(), 20);
        assert_eq!(reopened.inventory().synthesized().len(), 1);
    }

    #[test]
    fn test_lab_store_clear_history() {
        let mut store = LabStore::in_memory(20);
        store.record(sample_input("x"), sample_result()).unwrap();
        store.clear_history().unwrap();
        assert!(store.history().is_empty());
    }
}
