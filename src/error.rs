//! Error taxonomy shared by the annotation engine.

use thiserror::Error;

/// Hard failures of the engine. Input, remote and data problems are absorbed
/// where they occur; only these reach the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One lemma key was registered with two different sense sets.
    #[error("sense group key {key:?} already maps to {existing:?}, refusing {incoming:?}")]
    SenseGroupConflict {
        key: String,
        existing: Vec<u32>,
        incoming: Vec<u32>,
    },
    /// An entity id was about to be handed out twice.
    #[error("entity id {0} was already assigned")]
    IdReuse(u32),
    #[error("annotation run cancelled")]
    Cancelled,
    #[error("cache storage: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single remote round-trip.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("remote api error {code}: {info}")]
    Api { code: String, info: String },
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}
