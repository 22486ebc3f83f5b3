pub mod cache;
pub mod store;
pub mod locks;

pub mod timing_feed;
pub mod lap_detector;
pub mod gap_detector;
pub mod predictor;

pub mod models {
    pub mod race;
    pub mod runner;
    pub mod snapshot;
    pub mod lap;
    pub mod leaderboard;
}

pub mod helpers {
    pub mod math;
    pub mod logging;
}
