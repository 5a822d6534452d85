//! Persisted caption sequence counters
//!
//! One counter per broadcast stream key, written through to disk on every
//! update so a crash or restart never reuses a sequence number.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// File-backed map of stream key → last issued sequence number
pub struct SequenceStore {
    path: PathBuf,
    counters: HashMap<String, u64>,
}

impl SequenceStore {
    /// Open the store, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let counters = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            HashMap::new()
        };

        Ok(Self { path, counters })
    }

    /// Default location: `{data_dir}/captiond/counters.json`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("captiond")
            .join("counters.json")
    }

    /// Last issued sequence number for a stream key (0 = never used).
    pub fn get(&self, stream_key: &str) -> u64 {
        self.counters.get(stream_key).copied().unwrap_or(0)
    }

    /// Record and immediately persist a counter value.
    pub fn set(&mut self, stream_key: &str, value: u64) -> Result<()> {
        self.counters.insert(stream_key.to_string(), value);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.counters)?;
        std::fs::write(&self.path, contents)?;
        debug!("Persisted {} sequence counter(s)", self.counters.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_key_starts_at_zero() {
        let dir = tempdir().unwrap();
        let store = SequenceStore::open(dir.path().join("counters.json")).unwrap();
        assert_eq!(store.get("stream-a"), 0);
    }

    #[test]
    fn counters_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let mut store = SequenceStore::open(&path).unwrap();
        store.set("stream-a", 17).unwrap();
        store.set("stream-b", 3).unwrap();
        drop(store);

        let reopened = SequenceStore::open(&path).unwrap();
        assert_eq!(reopened.get("stream-a"), 17);
        assert_eq!(reopened.get("stream-b"), 3);
        assert_eq!(reopened.get("stream-c"), 0);
    }

    #[test]
    fn updates_overwrite_previous_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let mut store = SequenceStore::open(&path).unwrap();
        store.set("stream-a", 1).unwrap();
        store.set("stream-a", 2).unwrap();

        let reopened = SequenceStore::open(&path).unwrap();
        assert_eq!(reopened.get("stream-a"), 2);
    }
}
