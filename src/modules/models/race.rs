use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use crate::errors::{CustomResult, MissingRaceConfigSnafu, SerializationSnafu};
use crate::modules::store::{self, Store};

/// jitter guard around the lap threshold, as a fraction of the nominal lap.
pub const LAP_DISTANCE_TOLERANCE: f64 = 0.10;

/// strip everything that cannot appear in a race identifier. route
/// handlers compare the result against the raw input to reject requests.
pub fn sanitize_identifier(raw: &str) -> String {
    let re = regex::Regex::new(r"[^A-Za-z0-9_-]").unwrap();
    re.replace_all(raw, "").to_string()
}

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum RaceState {
    NotStarted,
    Live,
    Finished,
}

/// per-race singleton. mutated by the ingestion boundary on each successful
/// poll, read by every component.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct RaceConfig {
    pub race_id: String,
    pub race_state: RaceState,
    /// nominal lap length, mat to mat
    pub course_distance_km: f64,
    /// the start line is not the timing mat, so the first lap is shorter
    pub first_lap_distance_km: f64,
    /// distance from the mat to the crew spot, along the loop
    pub crew_spot_offset_m: f64,
    /// predictor fallback when a runner has no usable history yet
    pub default_lap_time_sec: f64,
    pub last_data_fetch: Option<DateTime<Utc>>,
}

impl RaceConfig {
    /************ GETTERS ************/

    /// # get the config of a race
    /// a race without a stored config is not an active race: the caller
    /// gets `MissingRaceConfigError` and decides what that means for it.
    pub fn get(store: &dyn Store, race_id: &str) -> CustomResult<RaceConfig> {
        let raw = store
            .get(&store::race_config_key(race_id))
            .context(MissingRaceConfigSnafu { race_id })?;

        serde_json::from_str(&raw).context(SerializationSnafu { what: "race config" })
    }

    /// # get all stored race configs
    /// enumerates every race the store knows about, whatever its state.
    pub fn get_all(store: &dyn Store) -> CustomResult<Vec<RaceConfig>> {
        let mut configs = Vec::new();
        for key in store.keys("race:") {
            if !key.ends_with(":config") {
                continue;
            }
            if let Some(raw) = store.get(&key) {
                let config: RaceConfig = serde_json::from_str(&raw)
                    .context(SerializationSnafu { what: "race config" })?;
                configs.push(config);
            }
        }

        configs.sort_by(|a, b| a.race_id.cmp(&b.race_id));
        Ok(configs)
    }

    /// all races currently in the `Live` state.
    pub fn get_live(store: &dyn Store) -> CustomResult<Vec<RaceConfig>> {
        Ok(RaceConfig::get_all(store)?
            .into_iter()
            .filter(|config| config.race_state == RaceState::Live)
            .collect())
    }

    /************ INSERTERS ************/

    pub fn save(&self, store: &dyn Store) -> CustomResult<()> {
        let raw =
            serde_json::to_string(self).context(SerializationSnafu { what: "race config" })?;
        store.put(&store::race_config_key(&self.race_id), raw);
        Ok(())
    }

    /************ UTILS ************/

    /// cumulative distance at which lap `lap` is complete.
    pub fn expected_distance_km(&self, lap: i32) -> f64 {
        self.first_lap_distance_km + (lap - 1) as f64 * self.course_distance_km
    }

    pub fn lap_tolerance_km(&self) -> f64 {
        self.course_distance_km * LAP_DISTANCE_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn sanitize_strips_path_tricks() {
        assert_eq!(sanitize_identifier("spring-24h_2024"), "spring-24h_2024");
        assert_eq!(sanitize_identifier("../etc/passwd"), "etcpasswd");
    }

    #[test]
    fn expected_distance_walks_the_loop() {
        let config = config();
        assert_eq!(config.expected_distance_km(1), 0.2);
        assert_eq!(config.expected_distance_km(2), 1.7);
        assert_eq!(config.expected_distance_km(3), 3.2);
    }

    #[test]
    fn tolerance_is_a_tenth_of_the_lap() {
        assert!((config().lap_tolerance_km() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn missing_config_is_an_error() {
        let store = MemoryStore::new();
        assert!(RaceConfig::get(&store, "nope").is_err());
    }

    #[test]
    fn save_then_get_roundtrips() {
        let store = MemoryStore::new();
        let config = config();
        config.save(&store).unwrap();
        assert_eq!(RaceConfig::get(&store, "r1").unwrap(), config);
    }

    #[test]
    fn get_live_filters_by_state() {
        let store = MemoryStore::new();
        let mut live = config();
        live.save(&store).unwrap();

        live.race_id = "r2".to_string();
        live.race_state = RaceState::Finished;
        live.save(&store).unwrap();

        let races = RaceConfig::get_live(&store).unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].race_id, "r1");
    }
}
