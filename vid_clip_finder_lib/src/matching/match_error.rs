use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the reasons an alignment search can fail.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum MatchError {
    /// No candidate is long enough to contain the query clip (which includes
    /// the case of an empty candidate set).
    #[error("no candidate can contain the query clip")]
    NoCandidates,

    /// The query fingerprints were produced with a different window or chunk
    /// length than the candidates', so offsets would not be comparable.
    #[error("incompatible fingerprint: {0}")]
    IncompatibleFingerprint(String),
}
