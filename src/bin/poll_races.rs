use std::sync::Arc;

use log::info;

use ultra_race_telemetry::cron_jobs::poll_all_races;
use ultra_race_telemetry::modules::helpers::logging::setup_logging;
use ultra_race_telemetry::modules::models::leaderboard::LeaderboardEntry;
use ultra_race_telemetry::modules::models::race::RaceConfig;
use ultra_race_telemetry::modules::store::MemoryStore;
use ultra_race_telemetry::AppState;

/// one-shot poll of every published race, dumping the resulting boards.
#[tokio::main]
async fn main() {
    setup_logging().expect("Failed to set up logging");

    let state = AppState::new(Arc::new(MemoryStore::new()));

    info!(target: "poll_races", "polling all races: date={}", chrono::Local::now().naive_local());
    poll_all_races(state.clone()).await;

    let configs = RaceConfig::get_all(state.store.as_ref()).expect("Failed to list races");
    for config in configs {
        let board = LeaderboardEntry::for_race(state.store.as_ref(), &config.race_id)
            .expect("Failed to load leaderboard");
        println!(
            "race {} ({} runners):\n{}",
            config.race_id,
            board.len(),
            serde_json::to_string_pretty(&board).unwrap()
        );
    }
}
