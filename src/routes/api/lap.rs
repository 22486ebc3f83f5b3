use std::collections::BTreeMap;

use log::error;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Serialize;

use crate::errors::Error;
use crate::macros::request_caching::{cache_response, read_cache_request};
use crate::modules::cache::{self, LAP_HISTORY_TTL};
use crate::modules::gap_detector;
use crate::modules::models::lap::Lap;
use crate::modules::models::race::{sanitize_identifier, RaceConfig};
use crate::AppState;

/**************************************************************************************************/
/**************** ROUTES **************************************************************************/
/**************************************************************************************************/

/// # get a runner's lap history
#[get("/races/<race_id>/laps/<bib>")]
pub fn get_lap_history(
    race_id: String,
    bib: i32,
    state: &State<AppState>,
) -> Result<Json<Vec<Lap>>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    let key = cache::lap_history_key(&race_id, bib);
    read_cache_request!(state.cache, key);

    match RaceConfig::get(state.store.as_ref(), &race_id) {
        Ok(_) => {}
        Err(Error::MissingRaceConfigError { .. }) => return Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/lap:get_lap_history", "Error loading race config: (race: {}, error: {})", race_id, error);
            return Err(Status::InternalServerError);
        }
    }

    let laps = match Lap::from_bib(state.store.as_ref(), &race_id, bib) {
        Ok(laps) => laps,
        Err(error) => {
            error!(target:"routes/api/lap:get_lap_history", "Error loading laps: (race: {}, bib: {}, error: {})", race_id, bib, error);
            return Err(Status::InternalServerError);
        }
    };

    cache_response!(state.cache, key, LAP_HISTORY_TTL, laps);
}

/// # get the lap-sequence holes of a race
/// diagnostic view, never cached: an admin looking at gaps wants the
/// current truth.
#[get("/races/<race_id>/gaps")]
pub fn get_gaps(
    race_id: String,
    state: &State<AppState>,
) -> Result<Json<BTreeMap<i32, Vec<i32>>>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    match RaceConfig::get(state.store.as_ref(), &race_id) {
        Ok(_) => {}
        Err(Error::MissingRaceConfigError { .. }) => return Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/lap:get_gaps", "Error loading race config: (race: {}, error: {})", race_id, error);
            return Err(Status::InternalServerError);
        }
    }

    match gap_detector::find_gaps(state.store.as_ref(), &race_id) {
        Ok(gaps) => Ok(Json(gaps)),
        Err(error) => {
            error!(target:"routes/api/lap:get_gaps", "Error scanning gaps: (race: {}, error: {})", race_id, error);
            Err(Status::InternalServerError)
        }
    }
}

/// # repair lap-sequence holes
/// the administrative backfill trigger. with `bib` only that runner is
/// repaired, without it the whole race.
#[post("/races/<race_id>/backfill?<bib>")]
pub fn run_backfill(
    race_id: String,
    bib: Option<i32>,
    state: &State<AppState>,
) -> Result<Json<RepairSummary>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    let result = match bib {
        Some(bib) => gap_detector::backfill(
            state.store.as_ref(),
            &state.cache,
            &state.locks,
            &race_id,
            bib,
        ),
        None => gap_detector::backfill_all(
            state.store.as_ref(),
            &state.cache,
            &state.locks,
            &race_id,
        ),
    };

    match result {
        Ok(repaired) => Ok(Json(RepairSummary { repaired })),
        Err(Error::MissingRaceConfigError { .. }) => Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/lap:run_backfill", "Error running backfill: (race: {}, error: {})", race_id, error);
            Err(Status::InternalServerError)
        }
    }
}

/**************************************************************************************************/
/**************** HELPERS *************************************************************************/
/**************************************************************************************************/

/// # Struct representing a json response for a backfill run
#[derive(Serialize)]
pub struct RepairSummary {
    pub repaired: usize,
}
