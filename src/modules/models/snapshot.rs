use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::errors::{CustomResult, SerializationSnafu};
use crate::modules::store::{self, Store};

/// one poll of the external timing provider for one bib. cumulative values
/// only move when the runner crosses the mat, so a snapshot is effectively
/// the runner's latest crossing as the provider saw it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct RaceSnapshot {
    pub race_id: String,
    pub bib: i32,
    pub distance_km: f64,
    pub race_time_sec: f64,
    pub last_passing: DateTime<Utc>,
}

/// last known progress of a bib: the value the lap detector threads from
/// call to call. stored next to the leaderboard row but owned by the
/// detector, and never rebuilt from the cache.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct RunnerProgressState {
    pub distance_km: f64,
    pub race_time_sec: f64,
    pub lap: i32,
    pub last_passing: DateTime<Utc>,
}

impl RunnerProgressState {
    pub fn get(
        store: &dyn Store,
        race_id: &str,
        bib: i32,
    ) -> CustomResult<Option<RunnerProgressState>> {
        match store.get(&store::progress_key(race_id, bib)) {
            Some(raw) => {
                let state = serde_json::from_str(&raw)
                    .context(SerializationSnafu { what: "progress state" })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn save(&self, store: &dyn Store, race_id: &str, bib: i32) -> CustomResult<()> {
        let raw =
            serde_json::to_string(self).context(SerializationSnafu { what: "progress state" })?;
        store.put(&store::progress_key(race_id, bib), raw);
        Ok(())
    }
}
