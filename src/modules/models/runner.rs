use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use crate::errors::{CustomResult, MissingRunnerSnafu, SerializationSnafu};
use crate::modules::store::{self, Store};

#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// the feed is not consistent about how it spells gender, so accept
    /// the spellings seen in the wild and reject the rest at the boundary.
    pub fn parse(raw: &str) -> Option<Gender> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" | "man" | "men" => Some(Gender::Male),
            "f" | "w" | "female" | "woman" | "women" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// identity of a registered runner in one race. the snapshot feed only
/// carries bib and cumulative values; everything the leaderboard shows
/// about a person comes from here.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Runner {
    pub race_id: String,
    pub bib: i32,
    pub name: String,
    pub gender: Gender,
    pub country: String,
    pub age_group: Option<String>,
}

impl Runner {
    /************ GETTERS ************/

    pub fn get(store: &dyn Store, race_id: &str, bib: i32) -> CustomResult<Runner> {
        let raw = store
            .get(&store::runner_key(race_id, bib))
            .context(MissingRunnerSnafu { race_id, bib })?;

        serde_json::from_str(&raw).context(SerializationSnafu { what: "runner" })
    }

    pub fn for_race(store: &dyn Store, race_id: &str) -> CustomResult<Vec<Runner>> {
        let mut runners = Vec::new();
        for key in store.keys(&store::runner_prefix(race_id)) {
            if let Some(raw) = store.get(&key) {
                let runner: Runner =
                    serde_json::from_str(&raw).context(SerializationSnafu { what: "runner" })?;
                runners.push(runner);
            }
        }

        runners.sort_by_key(|runner| runner.bib);
        Ok(runners)
    }

    /************ INSERTERS ************/

    pub fn save(&self, store: &dyn Store) -> CustomResult<()> {
        let raw = serde_json::to_string(self).context(SerializationSnafu { what: "runner" })?;
        store.put(&store::runner_key(&self.race_id, self.bib), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::store::MemoryStore;

    #[test]
    fn gender_spellings() {
        assert_eq!(Gender::parse("M"), Some(Gender::Male));
        assert_eq!(Gender::parse("female"), Some(Gender::Female));
        assert_eq!(Gender::parse("W"), Some(Gender::Female));
        assert_eq!(Gender::parse("x"), None);
    }

    #[test]
    fn save_then_get_roundtrips() {
        let store = MemoryStore::new();
        let runner = Runner {
            race_id: "r1".to_string(),
            bib: 12,
            name: "Anna Larsen".to_string(),
            gender: Gender::Female,
            country: "DEN".to_string(),
            age_group: Some("W40".to_string()),
        };
        runner.save(&store).unwrap();

        assert_eq!(Runner::get(&store, "r1", 12).unwrap(), runner);
        assert!(Runner::get(&store, "r1", 13).is_err());
    }
}
