use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// per-(race, bib) mutual exclusion. the lap detector and the backfiller
/// both write lap records for a bib, so whoever touches a bib first holds
/// the key until done. different bibs never contend.
pub struct BibLocks {
    inner: Mutex<HashMap<(String, i32), Arc<Mutex<()>>>>,
}

impl BibLocks {
    pub fn new() -> BibLocks {
        BibLocks {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// get the lock handle for a bib, creating it on first use. callers
    /// hold the returned mutex for the duration of their writes:
    ///
    /// ```ignore
    /// let handle = locks.for_bib(&race_id, bib);
    /// let _guard = handle.lock().unwrap();
    /// ```
    pub fn for_bib(&self, race_id: &str, bib: i32) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entry((race_id.to_string(), bib))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for BibLocks {
    fn default() -> Self {
        BibLocks::new()
    }
}
