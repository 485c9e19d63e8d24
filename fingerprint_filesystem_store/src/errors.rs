use std::path::PathBuf;

use thiserror::Error;

use crate::video_id::VideoId;

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No entry with the given id exists in the store.
    #[error("no video with id {0} in the store")]
    NotFound(VideoId),

    /// Io error reading or writing the store file itself.
    #[error("store file io error at {path}: {src}")]
    StoreFileIo { src: std::io::Error, path: PathBuf },

    /// The in-memory store could not be serialized to disk.
    #[error("store serialization error at {path}: {src}")]
    Serialization { src: String, path: PathBuf },

    /// A file in the collection directory could not be read (listing the
    /// directory, statting a file, or hashing its content).
    #[error("failed to read collection file {path}: {src}")]
    CollectionIo { src: std::io::Error, path: PathBuf },
}
