use std::sync::Arc;

use crate::modules::cache::TimingCache;
use crate::modules::locks::BibLocks;
use crate::modules::store::Store;

pub mod errors;
pub mod cron_jobs;

pub mod modules;

pub mod macros {
    pub mod request_caching;
}

pub mod routes {
    pub mod api {
        pub mod lap;
        pub mod leaderboard;
        pub mod prediction;
        pub mod race;
    }
}

/// everything the components need, constructed once in main and injected.
/// the cache is an optimization only; the store is the source of truth.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: TimingCache,
    pub locks: Arc<BibLocks>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> AppState {
        AppState {
            store,
            cache: TimingCache::new(),
            locks: Arc::new(BibLocks::new()),
        }
    }
}
