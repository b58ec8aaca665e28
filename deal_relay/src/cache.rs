use std::{
    fs,
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Mutex,
};

use serde::{Deserialize, Deserializer, Serialize};

/// Default number of trailing entries kept in the cache.
pub const DEFAULT_WINDOW: usize = 500;

/// Messages that were already relayed, by ID and by text fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenCache {
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub ids: Vec<String>,
    #[serde(default)]
    pub texts: Vec<String>,
}

impl SeenCache {
    /// True if the message was seen before, either by ID or by fingerprint.
    #[must_use]
    pub fn contains(&self, id: &str, fingerprint: &str) -> bool {
        self.ids.iter().any(|x| x == id) || self.texts.iter().any(|x| x == fingerprint)
    }

    pub fn remember(&mut self, id: String, fingerprint: String) {
        self.ids.push(id);
        self.texts.push(fingerprint);
    }

    /// Keep only the last `window` entries of each list.
    pub fn truncate(&mut self, window: usize) {
        fn keep_tail(list: &mut Vec<String>, window: usize) {
            if list.len() > window {
                list.drain(..list.len() - window);
            }
        }
        keep_tail(&mut self.ids, window);
        keep_tail(&mut self.texts, window);
    }
}

/// Older caches stored bare numeric message IDs. Take those too.
fn deserialize_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    let raw = Vec::<RawId>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|id| match id {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        })
        .collect())
}

/// Somewhere the seen-message cache lives between runs.
pub trait CacheStore {
    /// Load the cache. Never fails: a missing or broken cache is an empty one.
    fn load(&self) -> SeenCache;
    /// Persist the cache, trimmed to the store's window.
    fn save(&self, cache: &SeenCache) -> io::Result<()>;
}

/// A cache kept as a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
    window: usize,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>, window: usize) -> Self {
        Self {
            path: path.into(),
            window,
        }
    }
}

impl CacheStore for JsonFileCache {
    fn load(&self) -> SeenCache {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No cache at {}, starting fresh", self.path.display());
                return SeenCache::default();
            }
            Err(e) => {
                log::warn!("Failed to read cache {}: {}", self.path.display(), e);
                return SeenCache::default();
            }
        };

        serde_json::from_str(&data).unwrap_or_else(|e| {
            log::warn!("Cache {} is corrupt, resetting it: {}", self.path.display(), e);
            SeenCache::default()
        })
    }

    fn save(&self, cache: &SeenCache) -> io::Result<()> {
        let mut trimmed = cache.clone();
        trimmed.truncate(self.window);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string_pretty(&trimmed)?;
        fs::write(&self.path, data)?;

        log::debug!(
            "Saved cache with {} ids to {}",
            trimmed.ids.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// A cache that lives only as long as the process.
#[derive(Debug)]
pub struct MemoryCache {
    cache: Mutex<SeenCache>,
    window: usize,
}

impl MemoryCache {
    pub fn new(window: usize) -> Self {
        Self {
            cache: Mutex::default(),
            window,
        }
    }
}

impl CacheStore for MemoryCache {
    fn load(&self) -> SeenCache {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save(&self, cache: &SeenCache) -> io::Result<()> {
        let mut trimmed = cache.clone();
        trimmed.truncate(self.window);
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = trimmed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCache::new(dir.path().join("nope.json"), 500);
        assert_eq!(store.load(), SeenCache::default());
    }

    #[test]
    fn corrupt_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        fs::write(&path, "{\"ids\": [1, 2,").unwrap();
        let store = JsonFileCache::new(&path, 500);
        assert_eq!(store.load(), SeenCache::default());
    }

    #[test]
    fn legacy_numeric_ids_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        fs::write(&path, r#"{"ids": [123, "prezzitech_9"], "texts": ["a"]}"#).unwrap();
        let cache = JsonFileCache::new(&path, 500).load();
        assert_eq!(cache.ids, ["123", "prezzitech_9"]);
        assert_eq!(cache.texts, ["a"]);
    }

    #[test]
    fn save_creates_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCache::new(dir.path().join("bot").join("posted_cache.json"), 500);

        let mut cache = SeenCache::default();
        cache.remember("ch_1".to_string(), "cuffie 10€".to_string());
        store.save(&cache).unwrap();

        let loaded = store.load();
        assert!(loaded.contains("ch_1", "whatever"));
        assert!(loaded.contains("ch_2", "cuffie 10€"));
        assert!(!loaded.contains("ch_2", "altro"));
    }

    #[test]
    fn saved_cache_stays_within_window_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCache::new(dir.path().join("posted_cache.json"), 500);

        for run in 0..4 {
            let mut cache = store.load();
            for i in 0..300 {
                cache.remember(format!("ch_{run}_{i}"), format!("text {run} {i}"));
            }
            store.save(&cache).unwrap();

            let saved = store.load();
            assert!(saved.ids.len() <= 500);
            assert!(saved.texts.len() <= 500);
        }

        let saved = store.load();
        assert_eq!(saved.ids.len(), 500);
        // The newest entries are the ones kept.
        assert_eq!(saved.ids.last().map(String::as_str), Some("ch_3_299"));
        assert_eq!(saved.ids.first().map(String::as_str), Some("ch_2_100"));
    }

    #[test]
    fn memory_cache_truncates_too() {
        let store = MemoryCache::new(2);
        let mut cache = store.load();
        for i in 0..5 {
            cache.remember(i.to_string(), format!("t{i}"));
        }
        store.save(&cache).unwrap();
        assert_eq!(store.load().ids, ["3", "4"]);
    }
}
