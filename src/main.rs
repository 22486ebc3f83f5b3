use std::sync::Arc;

use rocket::{Build, Rocket};

use ultra_race_telemetry::cron_jobs::register_cron_jobs;
use ultra_race_telemetry::modules::helpers::logging::setup_logging;
use ultra_race_telemetry::modules::store::MemoryStore;
use ultra_race_telemetry::routes::api::{lap, leaderboard, prediction, race};
use ultra_race_telemetry::AppState;

#[macro_use] extern crate rocket;

#[launch]
async fn rocket() -> Rocket<Build> {
    if let Err(error) = setup_logging() {
        eprintln!("failed to set up logging: {}", error);
    }

    let state = AppState::new(Arc::new(MemoryStore::new()));

    // feed polling and the gap sweep run next to the api on the same state
    rocket::tokio::spawn(register_cron_jobs(state.clone()));

    rocket::build()
        .manage(state)
        .mount("/api", routes![
            race::list_races,
            race::get_race,
            leaderboard::get_leaderboard,
            lap::get_lap_history,
            lap::get_gaps,
            lap::run_backfill,
            prediction::get_predictions,
        ])
}
