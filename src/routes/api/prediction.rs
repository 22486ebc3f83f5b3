use chrono::Utc;
use log::error;
use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::errors::Error;
use crate::modules::models::race::sanitize_identifier;
use crate::modules::models::runner::Gender;
use crate::modules::predictor::{self, PredictionResult, PredictionSelector};
use crate::AppState;

/**************************************************************************************************/
/**************** ROUTES **************************************************************************/
/**************************************************************************************************/

/// # countdown predictions for a set of runners
/// select either explicit bibs (`?bibs=12,13`) or a slice of the field
/// (`?country=BEL&gender=women`). responses are never cached: the
/// countdown is relative to now.
///
/// every result carries its confidence; a zero-confidence estimate must
/// not be presented as authoritative.
#[get("/races/<race_id>/predictions?<bibs>&<country>&<gender>")]
pub fn get_predictions(
    race_id: String,
    bibs: Option<String>,
    country: Option<String>,
    gender: Option<String>,
    state: &State<AppState>,
) -> Result<Json<Vec<PredictionResult>>, Status> {
    let sanitized = sanitize_identifier(&race_id);
    if sanitized != race_id {
        return Err(Status::BadRequest);
    }

    let selector = match parse_selector(bibs, country, gender) {
        Some(selector) => selector,
        None => return Err(Status::BadRequest),
    };

    match predictor::countdown_predictions(state.store.as_ref(), &race_id, &selector, Utc::now()) {
        Ok(results) => Ok(Json(results)),
        Err(Error::MissingRaceConfigError { .. }) => Err(Status::NotFound),
        Err(error) => {
            error!(target:"routes/api/prediction:get_predictions", "Error predicting: (race: {}, error: {})", race_id, error);
            Err(Status::InternalServerError)
        }
    }
}

/**************************************************************************************************/
/**************** HELPERS *************************************************************************/
/**************************************************************************************************/

fn parse_selector(
    bibs: Option<String>,
    country: Option<String>,
    gender: Option<String>,
) -> Option<PredictionSelector> {
    if let Some(raw) = bibs {
        let mut parsed = Vec::new();
        for part in raw.split(',') {
            parsed.push(part.trim().parse::<i32>().ok()?);
        }
        if parsed.is_empty() {
            return None;
        }
        return Some(PredictionSelector::Bibs(parsed));
    }

    if country.is_none() && gender.is_none() {
        return None;
    }

    let gender = match gender {
        Some(raw) => Some(Gender::parse(&raw)?),
        None => None,
    };

    Some(PredictionSelector::Field { country, gender })
}
