//! A disk-backed store for the fingerprints of a video collection, and the
//! index manager that keeps it in step with the collection directory.
//!
//! The store is a single versioned file living next to the videos it
//! describes. Entries are keyed by a stable content-derived id (the blake3
//! hash of the file), so renaming a video never orphans its fingerprints;
//! the filename is just a mutable attribute. A schema version is recorded in
//! the file: when the version of the code and the file disagree, every entry
//! is dropped and metadata is re-synced from the directory rather than
//! migrated (correctness over continuity).
//!
//! [`VideoIndex`] is the one type most callers need:
//!
//! * [`sync`][VideoIndex::sync] reconciles the store with the files
//!   currently in the directory, touching fingerprints only when a file's
//!   content actually changed;
//! * [`fingerprint_all`][VideoIndex::fingerprint_all] fills in missing
//!   fingerprints, in parallel, skipping videos that already hold them;
//! * [`query`][VideoIndex::query] extracts fingerprints from a clip and
//!   returns which video it came from, at what timestamp, with what
//!   confidence. The result is always a typed status, never a raw decode
//!   error.

pub(crate) mod base_store;
pub(crate) mod errors;
pub(crate) mod store_entry;
pub(crate) mod video_id;
pub(crate) mod video_index;

pub use base_store::SCHEMA_VERSION;
pub use errors::StoreError;
pub use store_entry::{StoreEntry, VideoRecord};
pub use video_id::VideoId;
pub use video_index::{
    FfmpegVideoIndex, FingerprintReport, IndexState, QueryMatch, QueryResult, QueryStatus,
    SyncReport, VideoIndex, VideoIndexCfg, STORE_FILE_NAME,
};
