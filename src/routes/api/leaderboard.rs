use log::error;
use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::errors::Error;
use crate::macros::request_caching::{cache_response, read_cache_request};
use crate::modules::cache::{self, LEADERBOARD_TTL};
use crate::modules::models::leaderboard::{LeaderboardEntry, LeaderboardFilter};
use crate::modules::models::race::{sanitize_identifier, RaceConfig};
use crate::AppState;

/**************************************************************************************************/
/**************** ROUTES **************************************************************************/
/**************************************************************************************************/

/// # get a race's leaderboard
/// `filter` narrows to `men` or `women`; the gender ranks inside the rows
/// stay the independently dense ones, whatever the filter.
#[get("/races/<race_id>/leaderboard?<filter>")]
pub fn get_leaderboard(
    race_id: String,
    filter: Option<String>,
    state: &State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    let filter = match LeaderboardFilter::parse(filter.as_deref().unwrap_or("overall")) {
        Some(filter) => filter,
        None => return Err(Status::BadRequest),
    };

    let key = cache::leaderboard_key(&race_id, filter.as_str());
    read_cache_request!(state.cache, key);

    // an unknown race is not an empty board
    match RaceConfig::get(state.store.as_ref(), &race_id) {
        Ok(_) => {}
        Err(Error::MissingRaceConfigError { .. }) => return Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/leaderboard:get_leaderboard", "Error loading race config: (race: {}, error: {})", race_id, error);
            return Err(Status::InternalServerError);
        }
    }

    let entries =
        match LeaderboardEntry::for_race_filtered(state.store.as_ref(), &race_id, filter) {
            Ok(entries) => entries,
            Err(error) => {
                error!(target:"routes/api/leaderboard:get_leaderboard", "Error loading leaderboard: (race: {}, error: {})", race_id, error);
                return Err(Status::InternalServerError);
            }
        };

    cache_response!(state.cache, key, LEADERBOARD_TTL, entries);
}
