use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CustomResult;
use crate::modules::helpers::math::Math;
use crate::modules::models::lap::Lap;
use crate::modules::models::leaderboard::LeaderboardEntry;
use crate::modules::models::race::RaceConfig;
use crate::modules::models::runner::Gender;
use crate::modules::store::Store;

/// how far back the prediction window reaches.
pub const MAX_RECENT_LAPS: usize = 10;

/// coefficient of variation under which the window counts as fully stable.
const CV_STABLE: f64 = 0.05;
/// coefficient of variation at which confidence bottoms out. a rest break
/// in the window lands here no matter how many laps there are.
const CV_UNSTABLE: f64 = 0.35;
const MIN_STABILITY: f64 = 0.15;

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Prediction {
    pub predicted_lap_time_sec: f64,
    /// 0..1. zero means insufficient history; consumers must not present
    /// the estimate as authoritative then.
    pub confidence: f64,
    pub recent_laps_used: usize,
}

/// countdown for one runner, as served to crews.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct PredictionResult {
    pub bib: i32,
    pub predicted_lap_time_sec: f64,
    /// seconds until the next mat crossing. negative: the runner is overdue.
    pub time_until_timing_mat: f64,
    pub time_until_crew_spot: f64,
    pub confidence: f64,
    pub recent_laps: Vec<f64>,
}

/// which runners a countdown request covers.
pub enum PredictionSelector {
    Bibs(Vec<i32>),
    Field {
        country: Option<String>,
        gender: Option<Gender>,
    },
}

/// # predict the next lap time
/// weighted average over the last up-to-10 lap times, a linear ramp giving
/// the most recent lap weight 10 down to weight 1 for the tenth-most-recent.
/// recency matters over a 24h event - pace decays with fatigue - but the
/// older laps still anchor the estimate.
///
/// fewer than two laps is no history to extrapolate: the single known lap
/// time (or the race's default) comes back with confidence zero.
pub fn predict(recent_lap_times: &[f64], default_lap_time_sec: f64) -> Prediction {
    let skip = recent_lap_times.len().saturating_sub(MAX_RECENT_LAPS);
    let window = &recent_lap_times[skip..];

    if window.len() < 2 {
        return Prediction {
            predicted_lap_time_sec: window.last().copied().unwrap_or(default_lap_time_sec),
            confidence: 0.0,
            recent_laps_used: window.len(),
        };
    }

    let count = window.len();
    let weights: Vec<f64> = (0..count)
        .map(|index| (MAX_RECENT_LAPS - count + 1 + index) as f64)
        .collect();

    Prediction {
        predicted_lap_time_sec: Math::weighted_mean(window, &weights),
        confidence: confidence(window),
        recent_laps_used: count,
    }
}

/// sample count sets the ceiling, variance pulls it down.
fn confidence(window: &[f64]) -> f64 {
    let sample_factor = window.len() as f64 / MAX_RECENT_LAPS as f64;

    let cv = Math::coefficient_of_variation(window);
    let stability = if cv <= CV_STABLE {
        1.0
    } else if cv >= CV_UNSTABLE {
        MIN_STABILITY
    } else {
        1.0 - (cv - CV_STABLE) / (CV_UNSTABLE - CV_STABLE) * (1.0 - MIN_STABILITY)
    };

    Math::round_float_to_n_decimals(sample_factor * stability, 3)
}

/// seconds until the predicted mat crossing. negative means overdue, which
/// is a status for the consumer, not an error.
pub fn time_until_passing(
    last_passing: DateTime<Utc>,
    predicted_lap_time_sec: f64,
    now: DateTime<Utc>,
) -> f64 {
    let since_passing_sec = (now - last_passing).num_milliseconds() as f64 / 1000.0;
    predicted_lap_time_sec - since_passing_sec
}

/// extra seconds from the mat to the crew spot, linear in distance along
/// the loop at the predicted pace. the crew spot sits after the mat, so
/// its arrival is always later.
pub fn crew_spot_time_offset(
    lap_distance_km: f64,
    crew_spot_offset_m: f64,
    predicted_lap_time_sec: f64,
) -> f64 {
    predicted_lap_time_sec * (crew_spot_offset_m / 1000.0) / lap_distance_km
}

/// # countdown predictions for a race
/// resolves the selector against the current leaderboard, predicts each
/// runner's next lap from their recent history and derives both arrival
/// countdowns. results keep leaderboard order.
pub fn countdown_predictions(
    store: &dyn Store,
    race_id: &str,
    selector: &PredictionSelector,
    now: DateTime<Utc>,
) -> CustomResult<Vec<PredictionResult>> {
    let config = RaceConfig::get(store, race_id)?;
    let entries = LeaderboardEntry::for_race(store, race_id)?;

    let mut results = Vec::new();
    for entry in entries {
        let selected = match selector {
            PredictionSelector::Bibs(bibs) => bibs.contains(&entry.bib),
            PredictionSelector::Field { country, gender } => {
                country
                    .as_ref()
                    .map(|c| entry.country.eq_ignore_ascii_case(c))
                    .unwrap_or(true)
                    && gender.map(|g| entry.gender == g).unwrap_or(true)
            }
        };
        if !selected {
            continue;
        }

        let laps = Lap::from_bib(store, race_id, entry.bib)?;
        let recent = Lap::recent_lap_times(&laps, MAX_RECENT_LAPS);
        let prediction = predict(&recent, config.default_lap_time_sec);

        let until_mat = time_until_passing(
            entry.last_passing,
            prediction.predicted_lap_time_sec,
            now,
        );
        let crew_offset = crew_spot_time_offset(
            config.course_distance_km,
            config.crew_spot_offset_m,
            prediction.predicted_lap_time_sec,
        );

        results.push(PredictionResult {
            bib: entry.bib,
            predicted_lap_time_sec: prediction.predicted_lap_time_sec,
            time_until_timing_mat: until_mat,
            time_until_crew_spot: until_mat + crew_offset,
            confidence: prediction.confidence,
            recent_laps: recent,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn ten_identical_laps_predict_themselves_at_full_confidence() {
        let prediction = predict(&[600.0; 10], 720.0);
        assert!((prediction.predicted_lap_time_sec - 600.0).abs() < 1e-9);
        assert_eq!(prediction.confidence, 1.0);
        assert_eq!(prediction.recent_laps_used, 10);
    }

    #[test]
    fn a_single_lap_comes_back_with_zero_confidence() {
        let prediction = predict(&[612.0], 720.0);
        assert_eq!(prediction.predicted_lap_time_sec, 612.0);
        assert_eq!(prediction.confidence, 0.0);
        assert_eq!(prediction.recent_laps_used, 1);
    }

    #[test]
    fn no_history_falls_back_to_the_race_default() {
        let prediction = predict(&[], 720.0);
        assert_eq!(prediction.predicted_lap_time_sec, 720.0);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn recent_laps_weigh_more_than_old_ones() {
        // slowing runner: the prediction must sit above the plain mean
        let times = [500.0, 510.0, 520.0, 530.0, 540.0, 550.0, 560.0, 570.0, 580.0, 590.0];
        let prediction = predict(&times, 720.0);
        assert!(prediction.predicted_lap_time_sec > Math::mean(&times));
        assert!(prediction.predicted_lap_time_sec < 590.0);
    }

    #[test]
    fn only_the_last_ten_laps_are_considered() {
        let mut times = vec![10_000.0; 5];
        times.extend([600.0; 10]);
        let prediction = predict(&times, 720.0);
        assert!((prediction.predicted_lap_time_sec - 600.0).abs() < 1e-9);
        assert_eq!(prediction.recent_laps_used, 10);
    }

    #[test]
    fn confidence_is_monotonic_in_stability() {
        let steady = predict(&[600.0, 602.0, 598.0, 601.0, 599.0, 600.0], 720.0);
        // same sample count, one rest break in the window
        let erratic = predict(&[600.0, 602.0, 598.0, 601.0, 1_450.0, 600.0], 720.0);
        assert!(steady.confidence >= erratic.confidence);
        assert!(erratic.confidence < 0.3);
    }

    #[test]
    fn more_samples_raise_the_ceiling() {
        let five = predict(&[600.0; 5], 720.0);
        let ten = predict(&[600.0; 10], 720.0);
        assert!(ten.confidence > five.confidence);
        assert_eq!(five.confidence, 0.5);
    }

    #[test]
    fn overdue_runners_get_a_negative_countdown() {
        let last_passing = Utc.with_ymd_and_hms(2024, 5, 18, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 18, 12, 12, 0).unwrap();
        // predicted 600s, 720s already elapsed
        assert_eq!(time_until_passing(last_passing, 600.0, now), -120.0);
    }

    #[test]
    fn crew_spot_arrival_trails_the_mat() {
        // 250 m into a 1.5 km lap at 600 s/lap -> 100 s after the mat
        let offset = crew_spot_time_offset(1.5, 250.0, 600.0);
        assert!((offset - 100.0).abs() < 1e-9);
    }
}
