use snafu::Snafu;

pub type CustomResult<T> = Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// the incoming snapshot is older than the last recorded state for the
    /// bib. the snapshot is discarded and nothing is mutated.
    #[snafu(display(
        "stale snapshot for bib {} in race {}: time {}s behind {}s",
        bib, race_id, seen_time_sec, known_time_sec
    ))]
    StaleSnapshotError {
        race_id: String,
        bib: i32,
        seen_time_sec: f64,
        known_time_sec: f64,
    },

    /// the distance check passed but the computed lap time came out
    /// negative. the lap is rejected and counted as a detection anomaly.
    #[snafu(display(
        "negative lap time ({}s) for bib {} in race {}",
        lap_time_sec, bib, race_id
    ))]
    NegativeLapTimeError {
        race_id: String,
        bib: i32,
        lap_time_sec: f64,
    },

    /// no race config stored for the race. fatal to the calling operation.
    #[snafu(display("no active race config for race {}", race_id))]
    MissingRaceConfigError { race_id: String },

    /// a snapshot arrived for a bib that has no runner record yet.
    #[snafu(display("no runner record for bib {} in race {}", bib, race_id))]
    MissingRunnerError { race_id: String, bib: i32 },

    #[snafu(display("error (de)serializing {}: {}", what, source))]
    SerializationError {
        what: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("error requesting timing feed {}: {}", url, source))]
    FeedRequestError { url: String, source: reqwest::Error },

    #[snafu(display("malformed timing feed payload: {}", details))]
    FeedFormatError { details: String },
}
