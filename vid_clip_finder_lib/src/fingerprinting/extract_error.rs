use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaError;

/// Error type for the various reasons why a fingerprint could not be
/// extracted from a media file.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ExtractError {
    /// Decoding failed partway through the file. Any partial fingerprint is
    /// discarded, never returned or persisted.
    #[error("corrupt media at {src_path}: {source}")]
    CorruptMedia { src_path: PathBuf, source: MediaError },

    /// Extraction was cancelled at a window boundary.
    #[error("extraction cancelled: {0}")]
    Cancelled(PathBuf),
}

impl ExtractError {
    pub fn corrupt(src_path: impl Into<PathBuf>, source: MediaError) -> Self {
        Self::CorruptMedia {
            src_path: src_path.into(),
            source,
        }
    }
}
