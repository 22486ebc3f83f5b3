use std::collections::HashMap;
use std::sync::RwLock;

/// # keyed storage collaborator
/// the core never speaks sql: every record lives under a flat string key as
/// serialized json, and list-by-race / list-by-bib are prefix enumerations.
/// `replace_prefix` swaps a whole key range in one step so leaderboard
/// readers never observe a half-replaced board.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn delete(&self, key: &str);
    fn keys(&self, prefix: &str) -> Vec<String>;

    /// delete every key under `prefix` and insert `entries` in their place,
    /// atomically with respect to readers.
    fn replace_prefix(&self, prefix: &str, entries: Vec<(String, String)>);
}

/// in-process store. which technology backs the production deployment is a
/// collaborator decision; the core only relies on the `Store` contract.
pub struct MemoryStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.read().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.inner.write().unwrap().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.inner.write().unwrap().remove(key);
    }

    fn keys(&self, prefix: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn replace_prefix(&self, prefix: &str, entries: Vec<(String, String)>) {
        let mut inner = self.inner.write().unwrap();
        inner.retain(|key, _| !key.starts_with(prefix));
        for (key, value) in entries {
            inner.insert(key, value);
        }
    }
}

/************ KEY SCHEME ************/
// one place decides how records are addressed. the unique (race, bib, lap)
// key keeps backfill unable to corrupt lap numbering even on a lost race.

pub fn race_config_key(race_id: &str) -> String {
    format!("race:{}:config", race_id)
}

pub fn runner_key(race_id: &str, bib: i32) -> String {
    format!("race:{}:runner:{}", race_id, bib)
}

pub fn runner_prefix(race_id: &str) -> String {
    format!("race:{}:runner:", race_id)
}

pub fn progress_key(race_id: &str, bib: i32) -> String {
    format!("race:{}:progress:{}", race_id, bib)
}

pub fn lap_key(race_id: &str, bib: i32, lap: i32) -> String {
    format!("race:{}:lap:{}:{}", race_id, bib, lap)
}

pub fn lap_prefix_for_bib(race_id: &str, bib: i32) -> String {
    format!("race:{}:lap:{}:", race_id, bib)
}

pub fn lap_prefix_for_race(race_id: &str) -> String {
    format!("race:{}:lap:", race_id)
}

pub fn leaderboard_key(race_id: &str, bib: i32) -> String {
    format!("race:{}:board:{}", race_id, bib)
}

pub fn leaderboard_prefix(race_id: &str) -> String {
    format!("race:{}:board:", race_id)
}
