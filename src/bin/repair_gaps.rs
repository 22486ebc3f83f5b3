use std::sync::Arc;

use ultra_race_telemetry::cron_jobs::poll_all_races;
use ultra_race_telemetry::modules::gap_detector;
use ultra_race_telemetry::modules::helpers::logging::setup_logging;
use ultra_race_telemetry::modules::models::race::RaceConfig;
use ultra_race_telemetry::modules::store::MemoryStore;
use ultra_race_telemetry::AppState;

/// poll once, then scan every live race for lap-sequence holes and repair
/// them, printing what was done.
#[tokio::main]
async fn main() {
    setup_logging().expect("Failed to set up logging");

    let state = AppState::new(Arc::new(MemoryStore::new()));
    poll_all_races(state.clone()).await;

    let races = RaceConfig::get_live(state.store.as_ref()).expect("Failed to list live races");
    for config in races {
        let gaps = gap_detector::find_gaps(state.store.as_ref(), &config.race_id)
            .expect("Failed to scan for gaps");
        println!("race {}: {} bibs with holes", config.race_id, gaps.len());
        for (bib, missing) in &gaps {
            println!("  bib {}: missing laps {:?}", bib, missing);
        }

        let repaired = gap_detector::backfill_all(
            state.store.as_ref(),
            &state.cache,
            &state.locks,
            &config.race_id,
        )
        .expect("Backfill failed");
        println!("race {}: repaired {} lap records", config.race_id, repaired);
    }
}
