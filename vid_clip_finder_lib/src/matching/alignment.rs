use crate::fingerprinting::fingerprint::{AudioFingerprint, VisualFingerprint};

/// The fingerprints of a query clip, as produced by the
/// [`Extractor`][crate::Extractor] with the same configuration used when the
/// candidates were indexed.
#[derive(Clone, PartialEq, Debug)]
pub struct QueryFingerprints {
    pub audio: AudioFingerprint,
    pub visual: VisualFingerprint,
}

/// One candidate video to align the query against. `id` must be a stable,
/// unique key; ties between equally-good candidates are broken towards the
/// lowest id.
#[derive(Clone, Copy, Debug)]
pub struct CandidateFingerprints<'a> {
    pub id: &'a str,
    pub audio: &'a AudioFingerprint,
    pub visual: &'a VisualFingerprint,
}

/// The best alignment found across all candidates.
#[derive(Clone, PartialEq, Debug)]
pub struct BestAlignment {
    /// Id of the winning candidate.
    pub id: String,
    /// Offset of the query into the winning candidate, in whole windows.
    pub offset_windows: usize,
    /// The same offset in seconds (`offset_windows * window_secs`).
    pub offset_secs: f64,
    /// Combined audio+visual distance at the winning offset, in `0..=1`.
    pub distance: f64,
    /// Normalized margin between the winning candidate and the runner-up.
    /// 1.0 when there is no runner-up.
    pub confidence: f64,
    /// True when confidence fell below the configured ambiguity threshold.
    /// The alignment is still the best guess available.
    pub ambiguous: bool,
}
