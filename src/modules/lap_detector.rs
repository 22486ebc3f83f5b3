use log::warn;

use crate::errors::{CustomResult, NegativeLapTimeSnafu, StaleSnapshotSnafu};
use crate::modules::models::lap::Lap;
use crate::modules::models::race::RaceConfig;
use crate::modules::models::snapshot::{RaceSnapshot, RunnerProgressState};

/// what one snapshot did to a runner: possibly a fresh lap record (ranks
/// still unassigned), and the progress state to carry into the next call.
pub struct DetectionOutcome {
    pub new_lap: Option<Lap>,
    pub state: RunnerProgressState,
}

/// # detect a lap crossing
/// converts a cumulative-distance/time snapshot into at most one discrete
/// lap. the feed only advances cumulative values at a mat crossing, so the
/// snapshot delta against `previous` is the lap split itself.
///
/// the detected lap number comes from the distance, not from counting
/// calls: when the snapshot jumped several laps ahead only the observed
/// crossing is recorded and the skipped numbers are left as holes for the
/// gap detector, because a single snapshot has no intermediate pass times.
///
/// ## Arguments
/// * `previous` - the runner's last known progress, absent for a new runner
/// * `snapshot` - the fresh poll
/// * `config` - race config holding lap geometry
///
/// ## Returns
/// * `DetectionOutcome` - the new lap (if any) and the state to persist
pub fn detect_lap(
    previous: Option<&RunnerProgressState>,
    snapshot: &RaceSnapshot,
    config: &RaceConfig,
) -> CustomResult<DetectionOutcome> {
    if let Some(prev) = previous {
        // replayed or out-of-order delivery: drop it, keep the state
        if snapshot.race_time_sec < prev.race_time_sec || snapshot.distance_km < prev.distance_km {
            warn!(target:"modules/lap_detector:detect_lap",
                "rejecting stale snapshot for bib {} in race {}: {}s/{}km behind {}s/{}km",
                snapshot.bib, snapshot.race_id,
                snapshot.race_time_sec, snapshot.distance_km,
                prev.race_time_sec, prev.distance_km);
            return StaleSnapshotSnafu {
                race_id: snapshot.race_id.clone(),
                bib: snapshot.bib,
                seen_time_sec: snapshot.race_time_sec,
                known_time_sec: prev.race_time_sec,
            }
            .fail();
        }
    }

    let current_lap = previous.map(|state| state.lap).unwrap_or(0);
    let detected_lap = lap_for_distance(snapshot.distance_km, config);

    if detected_lap <= current_lap {
        // no new crossing, just carry the snapshot values forward
        return Ok(DetectionOutcome {
            new_lap: None,
            state: RunnerProgressState {
                distance_km: snapshot.distance_km,
                race_time_sec: snapshot.race_time_sec,
                lap: current_lap,
                last_passing: snapshot.last_passing,
            },
        });
    }

    let previous_time_sec = previous.map(|state| state.race_time_sec).unwrap_or(0.0);
    let lap_time_sec = snapshot.race_time_sec - previous_time_sec;
    if lap_time_sec < 0.0 {
        warn!(target:"modules/lap_detector:detect_lap",
            "rejecting lap {} for bib {} in race {}: negative lap time {}s",
            detected_lap, snapshot.bib, snapshot.race_id, lap_time_sec);
        return NegativeLapTimeSnafu {
            race_id: snapshot.race_id.clone(),
            bib: snapshot.bib,
            lap_time_sec,
        }
        .fail();
    }

    let new_lap = Lap {
        race_id: snapshot.race_id.clone(),
        bib: snapshot.bib,
        lap: detected_lap,
        lap_time_sec,
        race_time_sec: snapshot.race_time_sec,
        distance_km: snapshot.distance_km,
        rank: 0,
        gender_rank: 0,
        age_group_rank: 0,
        // the mat sits at a fixed point, so pace uses the nominal lap
        lap_pace_sec_km: lap_time_sec / config.course_distance_km,
        avg_pace_sec_km: snapshot.race_time_sec / snapshot.distance_km,
        interpolated: false,
        timestamp: snapshot.last_passing,
    };

    Ok(DetectionOutcome {
        new_lap: Some(new_lap),
        state: RunnerProgressState {
            distance_km: snapshot.distance_km,
            race_time_sec: snapshot.race_time_sec,
            lap: detected_lap,
            last_passing: snapshot.last_passing,
        },
    })
}

/// highest lap number whose threshold the distance has crossed. the first
/// lap is shorter than the rest and every threshold is softened by the
/// jitter tolerance.
pub fn lap_for_distance(distance_km: f64, config: &RaceConfig) -> i32 {
    let first_threshold = config.first_lap_distance_km - config.lap_tolerance_km();
    if distance_km < first_threshold {
        return 0;
    }

    1 + ((distance_km - first_threshold) / config.course_distance_km).floor() as i32
}
