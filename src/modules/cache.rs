use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// how long a cached leaderboard may be served before recomputation.
pub const LEADERBOARD_TTL: Duration = Duration::from_secs(30);
/// per-bib lap history changes once a lap, so it can sit longer.
pub const LAP_HISTORY_TTL: Duration = Duration::from_secs(60);
/// race config is mutated on every poll.
pub const RACE_CONFIG_TTL: Duration = Duration::from_secs(10);

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// process-wide ttl cache shielding the aggregates from redundant
/// recomputation. entries are serialized json, the same shape the store
/// holds, and are never a source of truth: every writer invalidates its
/// keys after a successful write and a miss falls through to the store.
#[derive(Clone)]
pub struct TimingCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl TimingCache {
    pub fn new() -> TimingCache {
        TimingCache {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// # get a cached value
    /// returns the value stored under `key` if it has not expired yet.
    /// expired entries are dropped on the way out.
    pub fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // expired: take the write lock only for the removal
        self.entries.write().unwrap().remove(key);
        None
    }

    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().unwrap().insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    /// # invalidate a key pattern
    /// drops every entry whose key starts with `prefix`. writers call this
    /// right after writing authoritative state.
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.entries
            .write()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// drop everything that already expired. called opportunistically from
    /// the cron sweep so dead races do not pin memory.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .unwrap()
            .retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for TimingCache {
    fn default() -> Self {
        TimingCache::new()
    }
}

/// cache key for a leaderboard view.
pub fn leaderboard_key(race_id: &str, filter: &str) -> String {
    format!("board:{}:{}", race_id, filter)
}

pub fn leaderboard_prefix(race_id: &str) -> String {
    format!("board:{}", race_id)
}

pub fn lap_history_key(race_id: &str, bib: i32) -> String {
    format!("laps:{}:{}", race_id, bib)
}

pub fn race_config_key(race_id: &str) -> String {
    format!("config:{}", race_id)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::TimingCache;

    #[test]
    fn set_then_get_roundtrips() {
        let cache = TimingCache::new();
        cache.set("board:r1:overall", "[]".to_string(), Duration::from_secs(30));
        assert_eq!(cache.get("board:r1:overall"), Some("[]".to_string()));
    }

    #[test]
    fn expired_entries_are_not_served() {
        let cache = TimingCache::new();
        cache.set("config:r1", "{}".to_string(), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("config:r1"), None);
    }

    #[test]
    fn prefix_invalidation_only_touches_matching_keys() {
        let cache = TimingCache::new();
        cache.set("board:r1:overall", "a".to_string(), Duration::from_secs(30));
        cache.set("board:r1:women", "b".to_string(), Duration::from_secs(30));
        cache.set("board:r2:overall", "c".to_string(), Duration::from_secs(30));

        cache.invalidate_prefix("board:r1");

        assert!(cache.get("board:r1:overall").is_none());
        assert!(cache.get("board:r1:women").is_none());
        assert_eq!(cache.get("board:r2:overall"), Some("c".to_string()));
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let cache = TimingCache::new();
        cache.set("laps:r1:12", "x".to_string(), Duration::from_millis(5));
        cache.set("laps:r1:13", "y".to_string(), Duration::from_secs(60));
        thread::sleep(Duration::from_millis(20));

        cache.purge_expired();

        assert!(!cache.has_data("laps:r1:12"));
        assert!(cache.has_data("laps:r1:13"));
    }
}
