use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::errors::{CustomResult, SerializationSnafu};
use crate::modules::store::{self, Store};

/// one completed lap of one runner. written by the lap detector; the gap
/// backfiller is the only writer allowed to overwrite time/pace fields of
/// an existing record, and only to repair a hole.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Lap {
    pub race_id: String,
    pub bib: i32,
    /// 1-based, unique per (race, bib)
    pub lap: i32,
    pub lap_time_sec: f64,
    /// cumulative race time at the crossing, non-decreasing across laps
    pub race_time_sec: f64,
    /// cumulative distance at the crossing, increasing across laps
    pub distance_km: f64,
    pub rank: i32,
    pub gender_rank: i32,
    pub age_group_rank: i32,
    pub lap_pace_sec_km: f64,
    pub avg_pace_sec_km: f64,
    /// reconstructed by the backfiller, not a measured split
    pub interpolated: bool,
    pub timestamp: DateTime<Utc>,
}

impl Lap {
    /************ INSERTERS ************/

    /// # insert a lap record
    /// writes the record under its `(race, bib, lap)` key. writing an
    /// existing key replaces the record, which is exactly the corrective
    /// overwrite the backfiller needs and harmless for anyone else.
    pub fn insert(store: &dyn Store, lap: &Lap) -> CustomResult<()> {
        let raw = serde_json::to_string(lap).context(SerializationSnafu { what: "lap record" })?;
        store.put(&store::lap_key(&lap.race_id, lap.bib, lap.lap), raw);
        Ok(())
    }

    /************ GETTERS ************/

    pub fn get(store: &dyn Store, race_id: &str, bib: i32, lap: i32) -> CustomResult<Option<Lap>> {
        match store.get(&store::lap_key(race_id, bib, lap)) {
            Some(raw) => {
                let record =
                    serde_json::from_str(&raw).context(SerializationSnafu { what: "lap record" })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// # get all laps of a bib
    /// ordered by lap number.
    pub fn from_bib(store: &dyn Store, race_id: &str, bib: i32) -> CustomResult<Vec<Lap>> {
        let mut laps = Vec::new();
        for key in store.keys(&store::lap_prefix_for_bib(race_id, bib)) {
            if let Some(raw) = store.get(&key) {
                let lap: Lap =
                    serde_json::from_str(&raw).context(SerializationSnafu { what: "lap record" })?;
                laps.push(lap);
            }
        }

        laps.sort_by_key(|lap| lap.lap);
        Ok(laps)
    }

    /// # get all laps of a race
    /// grouped per bib, each group ordered by lap number.
    pub fn from_race_as_map(
        store: &dyn Store,
        race_id: &str,
    ) -> CustomResult<HashMap<i32, Vec<Lap>>> {
        let mut bib_lap_map: HashMap<i32, Vec<Lap>> = HashMap::new();
        for key in store.keys(&store::lap_prefix_for_race(race_id)) {
            if let Some(raw) = store.get(&key) {
                let lap: Lap =
                    serde_json::from_str(&raw).context(SerializationSnafu { what: "lap record" })?;
                bib_lap_map.entry(lap.bib).or_default().push(lap);
            }
        }

        for laps in bib_lap_map.values_mut() {
            laps.sort_by_key(|lap| lap.lap);
        }

        Ok(bib_lap_map)
    }

    /************ UTILS ************/

    /// lap numbers missing from a contiguous 1..=max sequence. pure scan,
    /// no tolerance: numbering is integral by construction.
    pub fn missing_lap_numbers(laps: &[Lap]) -> Vec<i32> {
        let present: BTreeSet<i32> = laps.iter().map(|lap| lap.lap).collect();
        let max = match present.iter().next_back() {
            Some(max) => *max,
            None => return Vec::new(),
        };

        (1..=max).filter(|n| !present.contains(n)).collect()
    }

    /// the lap times of the most recent `count` laps, oldest first.
    pub fn recent_lap_times(laps: &[Lap], count: usize) -> Vec<f64> {
        let skip = laps.len().saturating_sub(count);
        laps.iter().skip(skip).map(|lap| lap.lap_time_sec).collect()
    }
}
