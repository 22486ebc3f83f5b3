use log::error;
use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::errors::Error;
use crate::macros::request_caching::{cache_response, read_cache_request};
use crate::modules::cache::{self, RACE_CONFIG_TTL};
use crate::modules::models::race::{sanitize_identifier, RaceConfig};
use crate::AppState;

/**************************************************************************************************/
/**************** ROUTES **************************************************************************/
/**************************************************************************************************/

/// # list all known races
#[get("/races")]
pub fn list_races(state: &State<AppState>) -> Result<Json<Vec<RaceConfig>>, Status> {
    match RaceConfig::get_all(state.store.as_ref()) {
        Ok(configs) => Ok(Json(configs)),
        Err(error) => {
            error!(target:"routes/api/race:list_races", "Error listing races: (error: {})", error);
            Err(Status::InternalServerError)
        }
    }
}

/// # get one race's config
#[get("/races/<race_id>")]
pub fn get_race(race_id: String, state: &State<AppState>) -> Result<Json<RaceConfig>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    let key = cache::race_config_key(&race_id);
    read_cache_request!(state.cache, key);

    let config = match RaceConfig::get(state.store.as_ref(), &race_id) {
        Ok(config) => config,
        Err(Error::MissingRaceConfigError { .. }) => return Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/race:get_race", "Error loading race: (race: {}, error: {})", race_id, error);
            return Err(Status::InternalServerError);
        }
    };

    cache_response!(state.cache, key, RACE_CONFIG_TTL, config);
}
