use std::env;

use chrono::{DateTime, Utc};
use dotenvy::dotenv;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::errors::{CustomResult, Error, FeedFormatSnafu, FeedRequestSnafu};
use crate::modules::cache::{self, TimingCache};
use crate::modules::lap_detector;
use crate::modules::locks::BibLocks;
use crate::modules::models::lap::Lap;
use crate::modules::models::leaderboard::LeaderboardEntry;
use crate::modules::models::race::{RaceConfig, RaceState};
use crate::modules::models::runner::{Gender, Runner};
use crate::modules::models::snapshot::{RaceSnapshot, RunnerProgressState};
use crate::modules::store::Store;

/// predictor fallback when the provider does not publish one for a race.
const DEFAULT_LAP_TIME_SEC: f64 = 720.0;

fn feed_base_url() -> String {
    dotenv().ok();
    env::var("FEED_BASE_URL").expect("FEED_BASE_URL must be set")
}

/// # list the races the provider currently publishes
pub async fn get_race_ids_from_feed() -> CustomResult<Vec<String>> {
    let request_url = format!("{}/races.json", feed_base_url());
    let response = reqwest::get(&request_url)
        .await
        .context(FeedRequestSnafu { url: request_url.clone() })?;

    let list: FeedRaceList = response
        .json()
        .await
        .context(FeedRequestSnafu { url: request_url })?;

    Ok(list.races.into_iter().map(|race| race.race_id).collect())
}

/// # fetch one race's full feed
/// race config plus the per-bib cumulative entries, as the provider's
/// scraper endpoint serves them.
pub async fn get_race_from_feed(race_id: &str) -> CustomResult<FeedRace> {
    info!(target: "modules/timing_feed:get_race_from_feed", "polling race {} from feed", race_id);
    let request_url = format!("{}/races/{}.json", feed_base_url(), race_id);
    let response = reqwest::get(&request_url)
        .await
        .context(FeedRequestSnafu { url: request_url.clone() })?;

    response
        .json()
        .await
        .context(FeedRequestSnafu { url: request_url })
}

/// # apply one polled feed to the store
/// upserts the race config (stamping `last_data_fetch`), upserts every
/// runner, and pushes each entry's snapshot through lap detection. rows
/// that fail boundary validation are logged and skipped; a stale or
/// negative-lap-time snapshot counts as rejected without stopping the
/// rest of the field.
pub fn save_race(
    store: &dyn Store,
    timing_cache: &TimingCache,
    locks: &BibLocks,
    feed: FeedRace,
    now: DateTime<Utc>,
) -> CustomResult<RaceIngestSummary> {
    let config = race_config_from_feed(&feed.race, now)?;
    config.save(store)?;
    timing_cache.invalidate(&cache::race_config_key(&config.race_id));

    let mut summary = RaceIngestSummary::default();
    for entry in &feed.entries {
        let (runner, snapshot) = match validate_entry(&config.race_id, entry) {
            Ok(pair) => pair,
            Err(details) => {
                warn!(target: "modules/timing_feed:save_race",
                    "skipping feed entry for race {}: {}", config.race_id, details);
                summary.rejected += 1;
                continue;
            }
        };

        runner.save(store)?;
        summary.bibs_seen += 1;

        match ingest_snapshot(store, timing_cache, locks, snapshot) {
            Ok(Some(_)) => summary.laps_detected += 1,
            Ok(None) => {}
            Err(Error::StaleSnapshotError { .. }) | Err(Error::NegativeLapTimeError { .. }) => {
                // already logged by the detector
                summary.rejected += 1;
            }
            Err(error) => return Err(error),
        }
    }

    info!(target: "modules/timing_feed:save_race",
        "race {} polled: {} bibs, {} new laps, {} rejected",
        config.race_id, summary.bibs_seen, summary.laps_detected, summary.rejected);

    Ok(summary)
}

/// # push one snapshot through the core
/// the hot ingestion path: detect, persist progress, refresh the runner's
/// leaderboard row, recompute ranks, then store the lap stamped with its
/// standings. holds the bib's lock so backfill can never interleave.
pub fn ingest_snapshot(
    store: &dyn Store,
    timing_cache: &TimingCache,
    locks: &BibLocks,
    snapshot: RaceSnapshot,
) -> CustomResult<Option<Lap>> {
    let config = RaceConfig::get(store, &snapshot.race_id)?;
    let runner = Runner::get(store, &snapshot.race_id, snapshot.bib)?;

    let handle = locks.for_bib(&snapshot.race_id, snapshot.bib);
    let _guard = handle.lock().unwrap();

    let previous = RunnerProgressState::get(store, &snapshot.race_id, snapshot.bib)?;
    let outcome = lap_detector::detect_lap(previous.as_ref(), &snapshot, &config)?;

    outcome.state.save(store, &snapshot.race_id, snapshot.bib)?;
    LeaderboardEntry::apply_progress(store, &runner, &outcome.state, outcome.new_lap.as_ref())?;
    let board = LeaderboardEntry::recompute(store, timing_cache, &snapshot.race_id)?;

    let mut new_lap = match outcome.new_lap {
        Some(lap) => lap,
        None => return Ok(None),
    };

    if let Some(entry) = board.iter().find(|entry| entry.bib == snapshot.bib) {
        new_lap.rank = entry.rank;
        new_lap.gender_rank = entry.gender_rank;
        new_lap.age_group_rank = entry.age_group_rank;
    }
    Lap::insert(store, &new_lap)?;
    timing_cache.invalidate(&cache::lap_history_key(&snapshot.race_id, snapshot.bib));

    info!(target: "modules/timing_feed:ingest_snapshot",
        "bib {} completed lap {} of race {} in {}s",
        new_lap.bib, new_lap.lap, new_lap.race_id, new_lap.lap_time_sec);

    Ok(Some(new_lap))
}

fn race_config_from_feed(info: &FeedRaceInfo, now: DateTime<Utc>) -> CustomResult<RaceConfig> {
    let race_state = match info.race_state.as_str() {
        "not_started" => RaceState::NotStarted,
        "live" => RaceState::Live,
        "finished" => RaceState::Finished,
        other => {
            return FeedFormatSnafu {
                details: format!("unknown race state `{}` for race {}", other, info.race_id),
            }
            .fail()
        }
    };

    if !info.course_distance_km.is_finite() || info.course_distance_km <= 0.0 {
        return FeedFormatSnafu {
            details: format!("invalid course distance for race {}", info.race_id),
        }
        .fail();
    }
    if !info.first_lap_distance_km.is_finite()
        || info.first_lap_distance_km <= 0.0
        || info.first_lap_distance_km > info.course_distance_km
    {
        return FeedFormatSnafu {
            details: format!("invalid first lap distance for race {}", info.race_id),
        }
        .fail();
    }

    Ok(RaceConfig {
        race_id: info.race_id.clone(),
        race_state,
        course_distance_km: info.course_distance_km,
        first_lap_distance_km: info.first_lap_distance_km,
        crew_spot_offset_m: info.crew_spot_offset_meters,
        default_lap_time_sec: info.default_lap_time_sec.unwrap_or(DEFAULT_LAP_TIME_SEC),
        last_data_fetch: Some(now),
    })
}

/// shape checks at the boundary so nothing downstream has to re-validate.
fn validate_entry(race_id: &str, entry: &FeedEntry) -> Result<(Runner, RaceSnapshot), String> {
    if entry.bib <= 0 {
        return Err(format!("invalid bib {}", entry.bib));
    }
    if !entry.cumulative_distance_km.is_finite() || entry.cumulative_distance_km < 0.0 {
        return Err(format!("invalid distance for bib {}", entry.bib));
    }
    if !entry.cumulative_race_time_sec.is_finite() || entry.cumulative_race_time_sec < 0.0 {
        return Err(format!("invalid race time for bib {}", entry.bib));
    }

    let gender = Gender::parse(&entry.gender)
        .ok_or_else(|| format!("unknown gender `{}` for bib {}", entry.gender, entry.bib))?;

    let last_passing = DateTime::parse_from_rfc3339(&entry.last_passing_timestamp)
        .map_err(|error| {
            format!(
                "bad passing timestamp `{}` for bib {}: {}",
                entry.last_passing_timestamp, entry.bib, error
            )
        })?
        .with_timezone(&Utc);

    let runner = Runner {
        race_id: race_id.to_string(),
        bib: entry.bib,
        name: entry.name.clone(),
        gender,
        country: entry.country.clone(),
        age_group: entry.age_group.clone(),
    };
    let snapshot = RaceSnapshot {
        race_id: race_id.to_string(),
        bib: entry.bib,
        distance_km: entry.cumulative_distance_km,
        race_time_sec: entry.cumulative_race_time_sec,
        last_passing,
    };

    Ok((runner, snapshot))
}

#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct RaceIngestSummary {
    pub bibs_seen: usize,
    pub laps_detected: usize,
    pub rejected: usize,
}

#[derive(Deserialize, Debug)]
struct FeedRaceList {
    #[serde(rename = "races")]
    pub races: Vec<FeedRaceSummary>,
}

#[derive(Deserialize, Debug)]
struct FeedRaceSummary {
    #[serde(rename = "raceId")]
    pub race_id: String,
}

#[derive(Deserialize, Debug)]
pub struct FeedRaceInfo {
    #[serde(rename = "raceId")]
    pub race_id: String,
    #[serde(rename = "raceState")]
    pub race_state: String,
    #[serde(rename = "courseDistanceKm")]
    pub course_distance_km: f64,
    #[serde(rename = "firstLapDistanceKm")]
    pub first_lap_distance_km: f64,
    #[serde(rename = "crewSpotOffsetMeters")]
    pub crew_spot_offset_meters: f64,
    #[serde(rename = "defaultLapTimeSec", default)]
    pub default_lap_time_sec: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct FeedEntry {
    #[serde(rename = "bib")]
    pub bib: i32,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "gender")]
    pub gender: String,
    #[serde(rename = "country")]
    pub country: String,
    #[serde(rename = "ageGroup", default)]
    pub age_group: Option<String>,
    #[serde(rename = "cumulativeDistanceKm")]
    pub cumulative_distance_km: f64,
    #[serde(rename = "cumulativeRaceTimeSec")]
    pub cumulative_race_time_sec: f64,
    #[serde(rename = "lastPassingTimestamp")]
    pub last_passing_timestamp: String,
}

#[derive(Deserialize, Debug)]
pub struct FeedRace {
    #[serde(rename = "race")]
    pub race: FeedRaceInfo,
    #[serde(rename = "entries")]
    pub entries: Vec<FeedEntry>,
}
