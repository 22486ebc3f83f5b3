use std::collections::{BTreeMap, HashMap};

use log::info;

use crate::errors::CustomResult;
use crate::modules::cache::{self, TimingCache};
use crate::modules::locks::BibLocks;
use crate::modules::models::lap::Lap;
use crate::modules::models::race::RaceConfig;
use crate::modules::models::snapshot::RunnerProgressState;
use crate::modules::store::Store;

/// # find lap-sequence holes in a race
/// scans every bib's lap numbers for absent integers in `1..=max`. bibs
/// with a contiguous sequence are left out of the result.
pub fn find_gaps(store: &dyn Store, race_id: &str) -> CustomResult<BTreeMap<i32, Vec<i32>>> {
    let mut gaps = BTreeMap::new();
    for (bib, laps) in Lap::from_race_as_map(store, race_id)? {
        let missing = Lap::missing_lap_numbers(&laps);
        if !missing.is_empty() {
            gaps.insert(bib, missing);
        }
    }

    Ok(gaps)
}

/// # repair one bib's lap sequence
/// rebuilds every missing lap by redistributing the runner's total elapsed
/// time proportionally over the expected cumulative distance, assuming
/// constant pace inside the gap window. the true split is unrecoverable, so
/// every written record is flagged `interpolated` - including the measured
/// crossing right after a hole, whose stored lap time spanned the gap and
/// gets corrected against the interpolated neighbour.
///
/// holds the bib's lock for the whole repair so it cannot interleave with
/// live lap detection for the same runner.
///
/// ## Returns
/// * `usize` - number of records written (created plus corrected)
pub fn backfill(
    store: &dyn Store,
    timing_cache: &TimingCache,
    locks: &BibLocks,
    race_id: &str,
    bib: i32,
) -> CustomResult<usize> {
    let config = RaceConfig::get(store, race_id)?;

    let handle = locks.for_bib(race_id, bib);
    let _guard = handle.lock().unwrap();

    let laps = Lap::from_bib(store, race_id, bib)?;
    if laps.is_empty() {
        return Ok(0);
    }

    let missing = Lap::missing_lap_numbers(&laps);
    if missing.is_empty() {
        return Ok(0);
    }

    // authoritative totals: the live progress state when present, the last
    // stored crossing otherwise
    let (total_distance_km, total_time_sec) =
        match RunnerProgressState::get(store, race_id, bib)? {
            Some(state) => (state.distance_km, state.race_time_sec),
            None => {
                let last = &laps[laps.len() - 1];
                (last.distance_km, last.race_time_sec)
            }
        };
    if total_distance_km <= 0.0 || total_time_sec <= 0.0 {
        return Ok(0);
    }

    let by_number: HashMap<i32, Lap> =
        laps.iter().map(|lap| (lap.lap, lap.clone())).collect();
    let mut race_times: BTreeMap<i32, f64> =
        laps.iter().map(|lap| (lap.lap, lap.race_time_sec)).collect();

    let mut repaired = 0;
    for lap_number in &missing {
        let distance_km = config.expected_distance_km(*lap_number);
        let race_time_sec = ((distance_km / total_distance_km) * total_time_sec).floor();
        let previous_time_sec = if *lap_number == 1 {
            0.0
        } else {
            race_times.get(&(lap_number - 1)).copied().unwrap_or(0.0)
        };

        // the crossing that actually covered the hole lends its standings
        let neighbour = laps.iter().find(|lap| lap.lap > *lap_number);

        let lap_time_sec = race_time_sec - previous_time_sec;
        let record = Lap {
            race_id: race_id.to_string(),
            bib,
            lap: *lap_number,
            lap_time_sec,
            race_time_sec,
            distance_km,
            rank: neighbour.map(|lap| lap.rank).unwrap_or(0),
            gender_rank: neighbour.map(|lap| lap.gender_rank).unwrap_or(0),
            age_group_rank: neighbour.map(|lap| lap.age_group_rank).unwrap_or(0),
            lap_pace_sec_km: lap_time_sec / config.course_distance_km,
            avg_pace_sec_km: race_time_sec / distance_km,
            interpolated: true,
            timestamp: neighbour
                .map(|lap| lap.timestamp)
                .unwrap_or(laps[laps.len() - 1].timestamp),
        };
        Lap::insert(store, &record)?;
        race_times.insert(*lap_number, race_time_sec);
        repaired += 1;

        // fix the measured lap right after the hole: its lap time spanned
        // the missing laps
        let next_number = lap_number + 1;
        if !missing.contains(&next_number) {
            if let Some(next) = by_number.get(&next_number) {
                let mut corrected = next.clone();
                corrected.lap_time_sec = corrected.race_time_sec - race_time_sec;
                corrected.lap_pace_sec_km = corrected.lap_time_sec / config.course_distance_km;
                corrected.interpolated = true;
                Lap::insert(store, &corrected)?;
                repaired += 1;
            }
        }
    }

    timing_cache.invalidate(&cache::lap_history_key(race_id, bib));

    info!(target:"modules/gap_detector:backfill",
        "repaired {} lap records for bib {} in race {} (gaps: {:?})",
        repaired, bib, race_id, missing);

    Ok(repaired)
}

/// repair every bib the gap scan flags. this is the administrative
/// `RunBackfill(race)` entry point and the cron sweep body.
pub fn backfill_all(
    store: &dyn Store,
    timing_cache: &TimingCache,
    locks: &BibLocks,
    race_id: &str,
) -> CustomResult<usize> {
    let mut repaired = 0;
    for bib in find_gaps(store, race_id)?.keys() {
        repaired += backfill(store, timing_cache, locks, race_id, *bib)?;
    }

    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::modules::models::race::RaceState;
    use crate::modules::store::MemoryStore;

    fn config() -> RaceConfig {
        RaceConfig {
            race_id: "r1".to_string(),
            race_state: RaceState::Live,
            course_distance_km: 1.5,
            first_lap_distance_km: 0.2,
            crew_spot_offset_m: 250.0,
            default_lap_time_sec: 720.0,
            last_data_fetch: None,
        }
    }

    fn lap(number: i32, race_time_sec: f64) -> Lap {
        let config = config();
        Lap {
            race_id: "r1".to_string(),
            bib: 12,
            lap: number,
            lap_time_sec: 600.0,
            race_time_sec,
            distance_km: config.expected_distance_km(number),
            rank: 3,
            gender_rank: 2,
            age_group_rank: 1,
            lap_pace_sec_km: 400.0,
            avg_pace_sec_km: 400.0,
            interpolated: false,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 18, 12, number as u32, 0).unwrap(),
        }
    }

    #[test]
    fn find_gaps_reports_only_broken_sequences() {
        let store = MemoryStore::new();
        config().save(&store).unwrap();
        for number in [1, 2, 4, 5] {
            Lap::insert(&store, &lap(number, number as f64 * 600.0)).unwrap();
        }
        let mut other = lap(1, 600.0);
        other.bib = 13;
        Lap::insert(&store, &other).unwrap();

        let gaps = find_gaps(&store, "r1").unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps.get(&12), Some(&vec![3]));
    }

    #[test]
    fn backfill_closes_the_hole_with_proportional_times() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();
        let locks = BibLocks::new();
        config().save(&store).unwrap();

        // laps 1,2,4,5 stored; the runner is at 5.0 km / 3000 s
        for (number, race_time) in [(1, 600.0), (2, 1200.0), (4, 2400.0), (5, 3000.0)] {
            let mut record = lap(number, race_time);
            if number == 5 {
                record.distance_km = 5.0;
            }
            Lap::insert(&store, &record).unwrap();
        }
        RunnerProgressState {
            distance_km: 5.0,
            race_time_sec: 3000.0,
            lap: 5,
            last_passing: Utc.with_ymd_and_hms(2024, 5, 18, 12, 50, 0).unwrap(),
        }
        .save(&store, "r1", 12)
        .unwrap();

        let repaired = backfill(&store, &timing_cache, &locks, "r1", 12).unwrap();
        // lap 3 created, lap 4 corrected
        assert_eq!(repaired, 2);

        let lap3 = Lap::get(&store, "r1", 12, 3).unwrap().unwrap();
        // floor((3.2 / 5.0) * 3000)
        assert_eq!(lap3.race_time_sec, 1920.0);
        assert_eq!(lap3.lap_time_sec, 720.0);
        assert!(lap3.interpolated);
        // standings borrowed from the crossing that covered the hole
        assert_eq!(lap3.rank, 3);

        let lap4 = Lap::get(&store, "r1", 12, 4).unwrap().unwrap();
        assert_eq!(lap4.lap_time_sec, 480.0);
        assert!(lap4.interpolated);

        // gap closure: the scan comes back clean and the sequence is whole
        assert!(find_gaps(&store, "r1").unwrap().is_empty());
        let numbers: Vec<i32> = Lap::from_bib(&store, "r1", 12)
            .unwrap()
            .iter()
            .map(|l| l.lap)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn backfill_without_gaps_is_a_noop() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();
        let locks = BibLocks::new();
        config().save(&store).unwrap();
        Lap::insert(&store, &lap(1, 600.0)).unwrap();
        Lap::insert(&store, &lap(2, 1200.0)).unwrap();

        assert_eq!(backfill(&store, &timing_cache, &locks, "r1", 12).unwrap(), 0);
        assert_eq!(backfill(&store, &timing_cache, &locks, "r1", 99).unwrap(), 0);
    }

    #[test]
    fn consecutive_holes_chain_their_race_times() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();
        let locks = BibLocks::new();
        config().save(&store).unwrap();

        // only laps 1 and 4 stored; at lap 4: 4.7 km, 2400 s
        let mut fourth = lap(4, 2400.0);
        fourth.distance_km = 4.7;
        Lap::insert(&store, &lap(1, 600.0)).unwrap();
        Lap::insert(&store, &fourth).unwrap();

        let repaired = backfill(&store, &timing_cache, &locks, "r1", 12).unwrap();
        // laps 2 and 3 created, lap 4 corrected
        assert_eq!(repaired, 3);

        let lap2 = Lap::get(&store, "r1", 12, 2).unwrap().unwrap();
        let lap3 = Lap::get(&store, "r1", 12, 3).unwrap().unwrap();
        // floor((1.7/4.7)*2400) = 868, floor((3.2/4.7)*2400) = 1634
        assert_eq!(lap2.race_time_sec, 868.0);
        assert_eq!(lap3.race_time_sec, 1634.0);
        assert_eq!(lap3.lap_time_sec, 1634.0 - 868.0);

        let lap4 = Lap::get(&store, "r1", 12, 4).unwrap().unwrap();
        assert_eq!(lap4.lap_time_sec, 2400.0 - 1634.0);
        assert!(find_gaps(&store, "r1").unwrap().is_empty());
    }
}
