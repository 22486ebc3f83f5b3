use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::modules::gap_detector;
use crate::modules::models::race::RaceConfig;
use crate::modules::timing_feed::{get_race_from_feed, get_race_ids_from_feed, save_race};
use crate::AppState;

/// # poll every published race once
/// fetches the provider's race list and runs each race's feed through
/// ingestion. races fail independently; one broken feed never starves the
/// others.
pub async fn poll_all_races(state: AppState) {
    let race_ids = match get_race_ids_from_feed().await {
        Ok(race_ids) => race_ids,
        Err(error) => {
            warn!(target:"cron_jobs:poll_all_races", "failed loading race list from feed. (error: {})", error);
            return;
        }
    };

    let mut tasks = JoinSet::new();
    for race_id in race_ids {
        let state = state.clone();
        tasks.spawn(async move {
            let feed = match get_race_from_feed(&race_id).await {
                Ok(feed) => feed,
                Err(error) => {
                    warn!(target:"cron_jobs:poll_all_races", "failed polling race from feed. (race_id: {}, error: {})", race_id, error);
                    return;
                }
            };

            match save_race(state.store.as_ref(), &state.cache, &state.locks, feed, Utc::now()) {
                Ok(summary) => {
                    info!(target:"cron_jobs:poll_all_races",
                        "polled race {}: {} bibs, {} new laps, {} rejected",
                        race_id, summary.bibs_seen, summary.laps_detected, summary.rejected);
                }
                Err(error) => {
                    warn!(target:"cron_jobs:poll_all_races", "failed saving race {}: (error: {})", race_id, error);
                }
            };
        });
    }

    while let Some(task) = tasks.join_next().await {
        task.unwrap();
    }
}

/// # repair lap-sequence holes in every live race
/// the scheduled counterpart of the administrative backfill trigger. kept
/// away from the polling path on purpose: backfill rewrites history.
pub async fn sweep_gaps(state: AppState) {
    let races = match RaceConfig::get_live(state.store.as_ref()) {
        Ok(races) => races,
        Err(error) => {
            warn!(target:"cron_jobs:sweep_gaps", "failed listing live races. (error: {})", error);
            return;
        }
    };

    for config in races {
        match gap_detector::backfill_all(state.store.as_ref(), &state.cache, &state.locks, &config.race_id) {
            Ok(0) => {}
            Ok(repaired) => {
                info!(target:"cron_jobs:sweep_gaps", "repaired {} lap records in race {}", repaired, config.race_id);
            }
            Err(error) => {
                warn!(target:"cron_jobs:sweep_gaps", "backfill failed for race {}. (error: {})", config.race_id, error);
            }
        }
    }

    state.cache.purge_expired();
}

pub async fn register_cron_jobs(state: AppState) {
    let scheduler = JobScheduler::new().await.unwrap();

    // poll the timing feed every 20 seconds
    let poll_state = state.clone();
    let j = Job::new_repeated_async(Duration::from_secs(20), move |_uuid, _l| {
        let state = poll_state.clone();
        Box::pin(async move {
            poll_all_races(state).await;
        })
    })
    .unwrap();
    scheduler.add(j).await.unwrap();

    // sweep for lap-sequence holes every 5 minutes
    let sweep_state = state.clone();
    let j = Job::new_repeated_async(Duration::from_secs(300), move |_uuid, _l| {
        let state = sweep_state.clone();
        Box::pin(async move {
            sweep_gaps(state).await;
        })
    })
    .unwrap();
    scheduler.add(j).await.unwrap();

    scheduler.start().await.unwrap();
}
