use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::errors::{CustomResult, SerializationSnafu};
use crate::modules::cache::{self, TimingCache};
use crate::modules::models::lap::Lap;
use crate::modules::models::runner::{Gender, Runner};
use crate::modules::models::snapshot::RunnerProgressState;
use crate::modules::store::{self, Store};

/// a lap pace within 5% of the runner's overall average counts as stable.
pub const TREND_BAND: f64 = 0.05;

/// nominal race duration the 24h projection extrapolates over.
const RACE_DURATION_SEC: f64 = 86_400.0;

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LeaderboardFilter {
    Overall,
    Men,
    Women,
}

impl LeaderboardFilter {
    pub fn parse(raw: &str) -> Option<LeaderboardFilter> {
        match raw {
            "overall" => Some(LeaderboardFilter::Overall),
            "men" => Some(LeaderboardFilter::Men),
            "women" => Some(LeaderboardFilter::Women),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardFilter::Overall => "overall",
            LeaderboardFilter::Men => "men",
            LeaderboardFilter::Women => "women",
        }
    }
}

/// current standing of one runner in one race. exactly one row per active
/// runner; the whole row-set of a race is replaced on every recompute so
/// ranks can never drift apart row by row.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct LeaderboardEntry {
    pub bib: i32,
    pub name: String,
    pub gender: Gender,
    pub country: String,
    pub age_group: Option<String>,
    pub rank: i32,
    pub gender_rank: i32,
    pub age_group_rank: i32,
    pub distance_km: f64,
    pub projected_km: f64,
    pub race_time_sec: f64,
    pub lap_time_sec: f64,
    pub lap_pace_sec: f64,
    pub lap: i32,
    pub trend: Trend,
    pub last_passing: DateTime<Utc>,
}

impl LeaderboardEntry {
    /************ GETTERS ************/

    /// # get the leaderboard of a race
    /// rows come back rank-ordered. an unknown race yields an empty board;
    /// whether that is an error is the caller's business.
    pub fn for_race(store: &dyn Store, race_id: &str) -> CustomResult<Vec<LeaderboardEntry>> {
        let mut entries = Vec::new();
        for key in store.keys(&store::leaderboard_prefix(race_id)) {
            if let Some(raw) = store.get(&key) {
                let entry: LeaderboardEntry = serde_json::from_str(&raw)
                    .context(SerializationSnafu { what: "leaderboard entry" })?;
                entries.push(entry);
            }
        }

        entries.sort_by_key(|entry| entry.rank);
        Ok(entries)
    }

    pub fn for_race_filtered(
        store: &dyn Store,
        race_id: &str,
        filter: LeaderboardFilter,
    ) -> CustomResult<Vec<LeaderboardEntry>> {
        let entries = LeaderboardEntry::for_race(store, race_id)?;
        let entries = match filter {
            LeaderboardFilter::Overall => entries,
            LeaderboardFilter::Men => entries
                .into_iter()
                .filter(|entry| entry.gender == Gender::Male)
                .collect(),
            LeaderboardFilter::Women => entries
                .into_iter()
                .filter(|entry| entry.gender == Gender::Female)
                .collect(),
        };

        Ok(entries)
    }

    pub fn for_bib(
        store: &dyn Store,
        race_id: &str,
        bib: i32,
    ) -> CustomResult<Option<LeaderboardEntry>> {
        match store.get(&store::leaderboard_key(race_id, bib)) {
            Some(raw) => {
                let entry = serde_json::from_str(&raw)
                    .context(SerializationSnafu { what: "leaderboard entry" })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /************ INSERTERS ************/

    /// # apply a runner's fresh progress to their row
    /// updates the raw per-runner fields only. ranks, projection and trend
    /// stay whatever they were until the next `recompute`, which is always
    /// scheduled right after this in the ingestion flow.
    pub fn apply_progress(
        store: &dyn Store,
        runner: &Runner,
        state: &RunnerProgressState,
        new_lap: Option<&Lap>,
    ) -> CustomResult<()> {
        let mut entry = match LeaderboardEntry::for_bib(store, &runner.race_id, runner.bib)? {
            Some(entry) => entry,
            None => LeaderboardEntry {
                bib: runner.bib,
                name: runner.name.clone(),
                gender: runner.gender,
                country: runner.country.clone(),
                age_group: runner.age_group.clone(),
                rank: 0,
                gender_rank: 0,
                age_group_rank: 0,
                distance_km: 0.0,
                projected_km: 0.0,
                race_time_sec: 0.0,
                lap_time_sec: 0.0,
                lap_pace_sec: 0.0,
                lap: 0,
                trend: Trend::Stable,
                last_passing: state.last_passing,
            },
        };

        entry.distance_km = state.distance_km;
        entry.race_time_sec = state.race_time_sec;
        entry.lap = state.lap;
        entry.last_passing = state.last_passing;
        if let Some(lap) = new_lap {
            entry.lap_time_sec = lap.lap_time_sec;
            entry.lap_pace_sec = lap.lap_pace_sec_km;
        }

        let raw = serde_json::to_string(&entry)
            .context(SerializationSnafu { what: "leaderboard entry" })?;
        store.put(&store::leaderboard_key(&runner.race_id, runner.bib), raw);
        Ok(())
    }

    /// # recompute a race's leaderboard
    /// the only rank authority. reads every row's raw state, orders by
    /// distance (earlier passing wins ties), assigns dense overall, gender
    /// and age-group ranks, derives projection and trend, then replaces the
    /// race's whole row-set in one store operation and drops the cached
    /// views. returns the new board in rank order.
    pub fn recompute(
        store: &dyn Store,
        timing_cache: &TimingCache,
        race_id: &str,
    ) -> CustomResult<Vec<LeaderboardEntry>> {
        let mut entries = LeaderboardEntry::for_race(store, race_id)?;

        entries.sort_by(|a, b| {
            b.distance_km
                .partial_cmp(&a.distance_km)
                .unwrap()
                .then(a.last_passing.cmp(&b.last_passing))
        });

        let mut gender_seen: HashMap<Gender, i32> = HashMap::new();
        let mut age_group_seen: HashMap<String, i32> = HashMap::new();

        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = position as i32 + 1;

            let gender_rank = gender_seen.entry(entry.gender).or_insert(0);
            *gender_rank += 1;
            entry.gender_rank = *gender_rank;

            entry.age_group_rank = match &entry.age_group {
                Some(group) => {
                    let age_rank = age_group_seen.entry(group.clone()).or_insert(0);
                    *age_rank += 1;
                    *age_rank
                }
                None => 0,
            };

            entry.projected_km = LeaderboardEntry::projected_km(entry.race_time_sec, entry.distance_km);
            entry.trend = LeaderboardEntry::classify_trend(
                entry.lap,
                entry.lap_pace_sec,
                entry.race_time_sec,
                entry.distance_km,
            );
        }

        let mut replacement = Vec::new();
        for entry in &entries {
            let raw = serde_json::to_string(entry)
                .context(SerializationSnafu { what: "leaderboard entry" })?;
            replacement.push((store::leaderboard_key(race_id, entry.bib), raw));
        }
        store.replace_prefix(&store::leaderboard_prefix(race_id), replacement);

        timing_cache.invalidate_prefix(&cache::leaderboard_prefix(race_id));

        Ok(entries)
    }

    /************ UTILS ************/

    /// distance after the nominal 24h assuming the average pace holds.
    pub fn projected_km(race_time_sec: f64, distance_km: f64) -> f64 {
        if race_time_sec == 0.0 {
            return 0.0;
        }

        (RACE_DURATION_SEC / race_time_sec) * distance_km
    }

    /// compare the latest lap's pace against the overall average pace.
    pub fn classify_trend(
        lap: i32,
        lap_pace_sec: f64,
        race_time_sec: f64,
        distance_km: f64,
    ) -> Trend {
        if lap == 0 || distance_km == 0.0 {
            return Trend::Stable;
        }

        let avg_pace = race_time_sec / distance_km;
        if lap_pace_sec < avg_pace * (1.0 - TREND_BAND) {
            Trend::Up
        } else if lap_pace_sec > avg_pace * (1.0 + TREND_BAND) {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::modules::store::MemoryStore;

    fn runner(bib: i32, gender: Gender) -> Runner {
        Runner {
            race_id: "r1".to_string(),
            bib,
            name: format!("runner {}", bib),
            gender,
            country: "NED".to_string(),
            age_group: Some(if gender == Gender::Male { "M40" } else { "W40" }.to_string()),
        }
    }

    fn progress(distance_km: f64, race_time_sec: f64, lap: i32, passing_min: u32) -> RunnerProgressState {
        RunnerProgressState {
            distance_km,
            race_time_sec,
            lap,
            last_passing: Utc.with_ymd_and_hms(2024, 5, 18, 13, passing_min, 0).unwrap(),
        }
    }

    #[test]
    fn ranks_are_dense_overall_and_per_gender() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();

        // 3 men and 2 women at distinct distances
        let field = [
            (12, Gender::Male, 30.5),
            (13, Gender::Female, 33.0),
            (14, Gender::Male, 28.0),
            (15, Gender::Female, 27.5),
            (16, Gender::Male, 31.0),
        ];
        for (bib, gender, distance) in field {
            let state = progress(distance, 10_000.0, 20, bib as u32);
            LeaderboardEntry::apply_progress(&store, &runner(bib, gender), &state, None).unwrap();
        }

        let board = LeaderboardEntry::recompute(&store, &timing_cache, "r1").unwrap();

        let ranks: Vec<i32> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        let bibs: Vec<i32> = board.iter().map(|e| e.bib).collect();
        assert_eq!(bibs, vec![13, 16, 12, 14, 15]);

        let men: Vec<i32> = board
            .iter()
            .filter(|e| e.gender == Gender::Male)
            .map(|e| e.gender_rank)
            .collect();
        assert_eq!(men, vec![1, 2, 3]);

        let women: Vec<i32> = board
            .iter()
            .filter(|e| e.gender == Gender::Female)
            .map(|e| e.gender_rank)
            .collect();
        assert_eq!(women, vec![1, 2]);
    }

    #[test]
    fn distance_ties_go_to_the_earlier_passing() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();

        LeaderboardEntry::apply_progress(
            &store,
            &runner(12, Gender::Male),
            &progress(30.0, 10_000.0, 20, 30),
            None,
        )
        .unwrap();
        LeaderboardEntry::apply_progress(
            &store,
            &runner(13, Gender::Male),
            &progress(30.0, 10_100.0, 20, 15),
            None,
        )
        .unwrap();

        let board = LeaderboardEntry::recompute(&store, &timing_cache, "r1").unwrap();
        assert_eq!(board[0].bib, 13);
        assert_eq!(board[1].bib, 12);
    }

    #[test]
    fn recompute_replaces_stale_rows() {
        let store = MemoryStore::new();
        let timing_cache = TimingCache::new();

        LeaderboardEntry::apply_progress(
            &store,
            &runner(12, Gender::Male),
            &progress(10.0, 5_000.0, 6, 10),
            None,
        )
        .unwrap();
        LeaderboardEntry::recompute(&store, &timing_cache, "r1").unwrap();

        // a row written outside the race prefix must survive, the race's
        // own rows are replaced wholesale
        store.put("race:r2:board:99", "{}".to_string());
        let board = LeaderboardEntry::recompute(&store, &timing_cache, "r1").unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(store.get("race:r2:board:99"), Some("{}".to_string()));
    }

    #[test]
    fn projection_extrapolates_average_pace() {
        // 10 km in 2h40 -> 90 km over 24h
        let projected = LeaderboardEntry::projected_km(9_600.0, 10.0);
        assert!((projected - 90.0).abs() < 1e-9);
        assert_eq!(LeaderboardEntry::projected_km(0.0, 10.0), 0.0);
    }

    #[test]
    fn trend_compares_lap_pace_to_average() {
        // avg pace 400 s/km
        assert_eq!(
            LeaderboardEntry::classify_trend(10, 370.0, 4_000.0, 10.0),
            Trend::Up
        );
        assert_eq!(
            LeaderboardEntry::classify_trend(10, 430.0, 4_000.0, 10.0),
            Trend::Down
        );
        assert_eq!(
            LeaderboardEntry::classify_trend(10, 405.0, 4_000.0, 10.0),
            Trend::Stable
        );
        // 5% band edges stay stable
        assert_eq!(
            LeaderboardEntry::classify_trend(10, 380.0, 4_000.0, 10.0),
            Trend::Stable
        );
        assert_eq!(
            LeaderboardEntry::classify_trend(0, 0.0, 0.0, 0.0),
            Trend::Stable
        );
    }
}
