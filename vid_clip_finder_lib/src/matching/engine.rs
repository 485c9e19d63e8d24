use rayon::prelude::*;

use crate::definitions::FRAME_HASH_BITS;
use crate::fingerprinting::fingerprint::{AudioFingerprint, VisualFingerprint};

use super::alignment::{BestAlignment, CandidateFingerprints, QueryFingerprints};
use super::match_error::MatchError;

/// Tuning knobs for the alignment search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Relative weight of the audio distance. The audio/visual weights are
    /// normalized to sum to one before use.
    pub audio_weight: f64,
    /// Relative weight of the visual distance.
    pub visual_weight: f64,
    /// Confidence below which the result is flagged ambiguous rather than
    /// rejected.
    pub ambiguity_threshold: f64,
    /// Distances closer than this are considered tied; ties resolve to the
    /// lowest candidate id, then the earliest offset.
    pub tie_epsilon: f64,
    /// Chunk offsets whose visual distance exceeds the candidate's best by
    /// more than this margin are skipped before any audio distance is
    /// computed. Set to 1.0 to disable pruning and scan exhaustively.
    pub visual_prefilter_margin: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            audio_weight: 0.5,
            visual_weight: 0.5,
            ambiguity_threshold: 0.1,
            tie_epsilon: 1e-9,
            visual_prefilter_margin: 0.2,
        }
    }
}

/// Slide the query across every candidate and return the best alignment.
///
/// For each candidate long enough to contain the query, the query is aligned
/// at every window offset. The distance at an offset combines the
/// mean-squared distance between the aligned audio descriptors (normalized to
/// `0..1`) and the mean Hamming distance between the aligned visual hashes,
/// weighted per [`MatchConfig`]. Candidates are scanned in parallel; the
/// cheap visual distance prunes offsets before the audio distance is
/// computed, and a scan abandons an offset as soon as its partial distance
/// exceeds the candidate's best.
///
/// # Errors
/// * [`MatchError::IncompatibleFingerprint`] if any candidate was
///   fingerprinted with different window/chunk lengths than the query.
/// * [`MatchError::NoCandidates`] if no candidate can contain the query.
pub fn find_best_alignment(
    query: &QueryFingerprints,
    candidates: &[CandidateFingerprints<'_>],
    cfg: &MatchConfig,
) -> Result<BestAlignment, MatchError> {
    if query.audio.len() == 0 && query.visual.len() == 0 {
        return Err(MatchError::NoCandidates);
    }

    for cand in candidates {
        check_compatible(query, cand)?;
    }

    let window_secs = effective_window_secs(query);
    if window_secs <= 0.0 {
        return Err(MatchError::IncompatibleFingerprint(
            "query fingerprint carries no window length".to_string(),
        ));
    }
    let windows_per_chunk = windows_per_chunk(query, window_secs);

    let eligible: Vec<CandidateFingerprints<'_>> = candidates
        .iter()
        .filter(|cand| cand.audio.len() >= query.audio.len() && cand.visual.len() >= query.visual.len())
        .filter(|cand| cand.audio.len() > 0 || cand.visual.len() > 0)
        .copied()
        .collect();

    // per-candidate minima, scanned in parallel. Each entry keeps its
    // candidate's id so the reduction below stays deterministic.
    let minima: Vec<(f64, &str, usize)> = eligible
        .par_iter()
        .filter_map(|cand| {
            scan_candidate(query, cand, cfg, windows_per_chunk).map(|(dist, offset)| (dist, cand.id, offset))
        })
        .collect();

    if minima.is_empty() {
        return Err(MatchError::NoCandidates);
    }

    let min_dist = minima.iter().map(|m| m.0).fold(f64::INFINITY, f64::min);
    let (distance, id, offset_windows) = minima
        .iter()
        .filter(|m| m.0 <= min_dist + cfg.tie_epsilon)
        .min_by(|a, b| (a.1, a.2).cmp(&(b.1, b.2)))
        .copied()
        .expect("nonempty minima");

    let runner_up = minima
        .iter()
        .filter(|m| m.1 != id)
        .map(|m| m.0)
        .fold(f64::INFINITY, f64::min);

    let confidence = if runner_up.is_infinite() {
        1.0
    } else if runner_up <= 0.0 {
        0.0
    } else {
        ((runner_up - distance) / runner_up).clamp(0.0, 1.0)
    };

    Ok(BestAlignment {
        id: id.to_string(),
        offset_windows,
        offset_secs: offset_windows as f64 * window_secs,
        distance,
        confidence,
        ambiguous: confidence < cfg.ambiguity_threshold,
    })
}

fn check_compatible(
    query: &QueryFingerprints,
    cand: &CandidateFingerprints<'_>,
) -> Result<(), MatchError> {
    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    if query.audio.len() > 0
        && cand.audio.len() > 0
        && !approx_eq(query.audio.window_secs(), cand.audio.window_secs())
    {
        return Err(MatchError::IncompatibleFingerprint(format!(
            "audio window length mismatch: query {}s, candidate {} {}s",
            query.audio.window_secs(),
            cand.id,
            cand.audio.window_secs(),
        )));
    }

    if query.visual.len() > 0
        && cand.visual.len() > 0
        && !approx_eq(query.visual.chunk_secs(), cand.visual.chunk_secs())
    {
        return Err(MatchError::IncompatibleFingerprint(format!(
            "visual chunk length mismatch: query {}s, candidate {} {}s",
            query.visual.chunk_secs(),
            cand.id,
            cand.visual.chunk_secs(),
        )));
    }

    Ok(())
}

// Offsets are expressed in audio windows. A query with no audio sequence
// falls back to the visual chunk length as its offset unit.
fn effective_window_secs(query: &QueryFingerprints) -> f64 {
    if query.audio.window_secs() > 0.0 {
        query.audio.window_secs()
    } else {
        query.visual.chunk_secs()
    }
}

fn windows_per_chunk(query: &QueryFingerprints, window_secs: f64) -> usize {
    if query.visual.chunk_secs() > 0.0 {
        ((query.visual.chunk_secs() / window_secs).round() as usize).max(1)
    } else {
        1
    }
}

// The minimum combined distance over all offsets of one candidate, or None
// if the candidate cannot be scanned.
fn scan_candidate(
    query: &QueryFingerprints,
    cand: &CandidateFingerprints<'_>,
    cfg: &MatchConfig,
    windows_per_chunk: usize,
) -> Option<(f64, usize)> {
    // an all-silent audio sequence carries no alignment information, so the
    // scan falls back to the chunk-granular visual distance
    let use_audio =
        query.audio.len() > 0 && !query.audio.is_all_silent() && cand.audio.len() >= query.audio.len();
    let use_visual = query.visual.len() > 0 && cand.visual.len() >= query.visual.len();

    if !use_audio && !use_visual {
        return None;
    }

    let visual_dists: Vec<f64> = if use_visual {
        let num_offsets = cand.visual.len() - query.visual.len() + 1;
        (0..num_offsets)
            .map(|c| visual_distance(&query.visual, cand.visual, c))
            .collect()
    } else {
        vec![]
    };

    let (audio_weight, visual_weight) = effective_weights(cfg, use_audio, use_visual);

    // Without audio the scan is chunk-granular.
    if !use_audio {
        return visual_dists
            .iter()
            .enumerate()
            .map(|(c, d)| (*d, c * windows_per_chunk))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    }

    let max_offset = cand.audio.len() - query.audio.len();
    let allowed = allowed_offsets(&visual_dists, cfg, windows_per_chunk, max_offset);

    let mut best: Option<(f64, usize)> = None;
    for offset in 0..=max_offset {
        if !allowed[offset] {
            continue;
        }

        let visual_dist = if use_visual {
            visual_dists[nearest_chunk(offset, windows_per_chunk, visual_dists.len())]
        } else {
            0.0
        };

        let base = visual_weight * visual_dist;
        if let Some((best_dist, _)) = best {
            // the audio term can only add distance
            if base >= best_dist {
                continue;
            }
        }

        let budget = best.map(|(best_dist, _)| (best_dist - base) / audio_weight);
        let Some(audio_norm) = audio_distance_capped(&query.audio, cand.audio, offset, budget) else {
            continue;
        };

        let combined = base + audio_weight * audio_norm;
        if best.map_or(true, |(best_dist, _)| combined < best_dist) {
            best = Some((combined, offset));
        }
    }

    best
}

// Which window offsets survive the visual pre-filter. A chunk offset within
// the margin of the candidate's best admits the window offsets it covers
// (plus half a chunk each side, since the true alignment rarely falls on the
// chunk grid).
fn allowed_offsets(
    visual_dists: &[f64],
    cfg: &MatchConfig,
    windows_per_chunk: usize,
    max_offset: usize,
) -> Vec<bool> {
    let mut allowed = vec![true; max_offset + 1];

    if visual_dists.is_empty() || cfg.visual_prefilter_margin >= 1.0 {
        return allowed;
    }

    let best_visual = visual_dists.iter().copied().fold(f64::INFINITY, f64::min);

    allowed.fill(false);
    let half_chunk = windows_per_chunk / 2 + 1;
    for (c, dist) in visual_dists.iter().enumerate() {
        if *dist > best_visual + cfg.visual_prefilter_margin {
            continue;
        }

        let center = c * windows_per_chunk;
        let lo = center.saturating_sub(half_chunk);
        let hi = if c + 1 == visual_dists.len() {
            // the final chunk offset covers every remaining window offset
            max_offset
        } else {
            (center + windows_per_chunk + half_chunk).min(max_offset)
        };
        for slot in allowed.iter_mut().take(hi + 1).skip(lo) {
            *slot = true;
        }
    }

    allowed
}

fn nearest_chunk(offset: usize, windows_per_chunk: usize, num_chunk_offsets: usize) -> usize {
    ((offset + windows_per_chunk / 2) / windows_per_chunk).min(num_chunk_offsets - 1)
}

fn effective_weights(cfg: &MatchConfig, use_audio: bool, use_visual: bool) -> (f64, f64) {
    match (use_audio, use_visual) {
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        _ => {
            let sum = cfg.audio_weight + cfg.visual_weight;
            if sum <= 0.0 {
                (0.5, 0.5)
            } else {
                (cfg.audio_weight / sum, cfg.visual_weight / sum)
            }
        }
    }
}

/// Mean Hamming distance between the aligned visual hashes, normalized by
/// the hash width into `0..=1`.
fn visual_distance(query: &VisualFingerprint, cand: &VisualFingerprint, chunk_offset: usize) -> f64 {
    let query_chunks = query.chunks();
    let cand_chunks = &cand.chunks()[chunk_offset..chunk_offset + query_chunks.len()];

    let total_bits: u32 = query_chunks
        .iter()
        .zip(cand_chunks)
        .map(|(q, c)| (q ^ c).count_ones())
        .sum();

    total_bits as f64 / (query_chunks.len() * FRAME_HASH_BITS) as f64
}

// Mean-squared distance between the aligned audio descriptors, normalized
// into 0..1 with d/(d+1). `budget` is the normalized distance above which the
// offset can no longer win; the scan stops early once the partial sum proves
// that bound is exceeded, returning None.
fn audio_distance_capped(
    query: &AudioFingerprint,
    cand: &AudioFingerprint,
    offset: usize,
    budget: Option<f64>,
) -> Option<f64> {
    let query_windows = query.windows();
    let cand_windows = &cand.windows()[offset..offset + query_windows.len()];

    let dims = (query_windows.len() * query_windows[0].coeffs.len()) as f64;
    let raw_cap = match budget {
        Some(b) if b <= 0.0 => return None,
        // invert d/(d+1) <= b
        Some(b) if b < 1.0 => Some(b / (1.0 - b) * dims),
        _ => None,
    };

    let mut sum_sq = 0.0f64;
    for (q, c) in query_windows.iter().zip(cand_windows) {
        for (qc, cc) in q.coeffs.iter().zip(c.coeffs.iter()) {
            let diff = (*qc - *cc) as f64;
            sum_sq += diff * diff;
        }
        if let Some(cap) = raw_cap {
            if sum_sq > cap {
                return None;
            }
        }
    }

    let mse = sum_sq / dims;
    Some(mse / (mse + 1.0))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fingerprinting::fingerprint::AudioWindow;
    use crate::test_util::{random_audio_fingerprint, random_visual_fingerprint};
    use rand::prelude::*;

    fn audio_slice(fp: &AudioFingerprint, start: usize, len: usize) -> AudioFingerprint {
        AudioFingerprint::new(fp.windows()[start..start + len].to_vec(), fp.window_secs())
    }

    fn visual_slice(fp: &VisualFingerprint, start: usize, len: usize) -> VisualFingerprint {
        VisualFingerprint::new(fp.chunks()[start..start + len].to_vec(), fp.chunk_secs())
    }

    fn query_from(audio: &AudioFingerprint, visual: &VisualFingerprint) -> QueryFingerprints {
        QueryFingerprints {
            audio: audio.clone(),
            visual: visual.clone(),
        }
    }

    #[test]
    fn test_empty_candidate_set_is_no_candidates() {
        let mut rng = StdRng::seed_from_u64(1);
        let audio = random_audio_fingerprint(&mut rng, 50, 0.1);
        let visual = random_visual_fingerprint(&mut rng, 2, 2.0);

        let result = find_best_alignment(&query_from(&audio, &visual), &[], &MatchConfig::default());
        assert!(matches!(result, Err(MatchError::NoCandidates)));
    }

    #[test]
    fn test_query_longer_than_every_candidate_is_no_candidates() {
        let mut rng = StdRng::seed_from_u64(2);
        let cand_audio = random_audio_fingerprint(&mut rng, 50, 0.1);
        let cand_visual = random_visual_fingerprint(&mut rng, 2, 2.0);
        let query_audio = random_audio_fingerprint(&mut rng, 100, 0.1);
        let query_visual = random_visual_fingerprint(&mut rng, 5, 2.0);

        let candidates = [CandidateFingerprints {
            id: "short",
            audio: &cand_audio,
            visual: &cand_visual,
        }];

        let result = find_best_alignment(
            &query_from(&query_audio, &query_visual),
            &candidates,
            &MatchConfig::default(),
        );
        assert!(matches!(result, Err(MatchError::NoCandidates)));
    }

    #[test]
    fn test_window_length_mismatch_is_incompatible() {
        let mut rng = StdRng::seed_from_u64(3);
        let cand_audio = random_audio_fingerprint(&mut rng, 100, 0.2);
        let cand_visual = random_visual_fingerprint(&mut rng, 5, 2.0);
        let query_audio = random_audio_fingerprint(&mut rng, 50, 0.1);
        let query_visual = random_visual_fingerprint(&mut rng, 2, 2.0);

        let candidates = [CandidateFingerprints {
            id: "other_grid",
            audio: &cand_audio,
            visual: &cand_visual,
        }];

        let result = find_best_alignment(
            &query_from(&query_audio, &query_visual),
            &candidates,
            &MatchConfig::default(),
        );
        assert!(matches!(result, Err(MatchError::IncompatibleFingerprint(_))));
    }

    #[test]
    fn test_verbatim_slice_aligns_at_its_offset_with_zero_distance() {
        let mut rng = StdRng::seed_from_u64(4);
        let cand_audio = random_audio_fingerprint(&mut rng, 900, 0.1);
        let cand_visual = random_visual_fingerprint(&mut rng, 45, 2.0);

        // a 5s slice taken at 40s: windows 400..450, chunks 20..22
        let query = query_from(
            &audio_slice(&cand_audio, 400, 50),
            &visual_slice(&cand_visual, 20, 2),
        );

        let other_audio = random_audio_fingerprint(&mut rng, 600, 0.1);
        let other_visual = random_visual_fingerprint(&mut rng, 30, 2.0);

        let candidates = [
            CandidateFingerprints {
                id: "a",
                audio: &other_audio,
                visual: &other_visual,
            },
            CandidateFingerprints {
                id: "b",
                audio: &cand_audio,
                visual: &cand_visual,
            },
        ];

        let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();

        assert_eq!(best.id, "b");
        assert_eq!(best.offset_windows, 400);
        assert!((best.offset_secs - 40.0).abs() < 1e-9);
        assert!(best.distance < 1e-12);
        assert!(!best.ambiguous);
        assert!(best.confidence > 0.5);
    }

    #[test]
    fn test_self_match_is_offset_zero_distance_zero_confidence_max() {
        let mut rng = StdRng::seed_from_u64(5);
        let audio = random_audio_fingerprint(&mut rng, 300, 0.1);
        let visual = random_visual_fingerprint(&mut rng, 15, 2.0);

        let candidates = [CandidateFingerprints {
            id: "only",
            audio: &audio,
            visual: &visual,
        }];

        let best =
            find_best_alignment(&query_from(&audio, &visual), &candidates, &MatchConfig::default())
                .unwrap();

        assert_eq!(best.offset_windows, 0);
        assert!(best.distance < 1e-12);
        assert_eq!(best.confidence, 1.0);
        assert!(!best.ambiguous);
    }

    #[test]
    fn test_identical_candidates_tie_to_lowest_id_and_flag_ambiguous() {
        let mut rng = StdRng::seed_from_u64(6);
        let audio = random_audio_fingerprint(&mut rng, 200, 0.1);
        let visual = random_visual_fingerprint(&mut rng, 10, 2.0);

        let query = query_from(&audio_slice(&audio, 60, 40), &visual_slice(&visual, 3, 2));

        let candidates = [
            CandidateFingerprints {
                id: "zz_copy",
                audio: &audio,
                visual: &visual,
            },
            CandidateFingerprints {
                id: "aa_copy",
                audio: &audio,
                visual: &visual,
            },
        ];

        let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();

        assert_eq!(best.id, "aa_copy");
        assert_eq!(best.offset_windows, 60);
        assert_eq!(best.confidence, 0.0);
        assert!(best.ambiguous);
    }

    #[test]
    fn test_exhaustive_and_prefiltered_scans_agree_on_verbatim_slices() {
        let mut rng = StdRng::seed_from_u64(7);
        let audio = random_audio_fingerprint(&mut rng, 400, 0.1);
        let visual = random_visual_fingerprint(&mut rng, 20, 2.0);

        let query = query_from(&audio_slice(&audio, 123, 60), &visual_slice(&visual, 6, 3));
        let candidates = [CandidateFingerprints {
            id: "v",
            audio: &audio,
            visual: &visual,
        }];

        let pruned = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();

        let exhaustive_cfg = MatchConfig {
            visual_prefilter_margin: 1.0,
            ..MatchConfig::default()
        };
        let exhaustive = find_best_alignment(&query, &candidates, &exhaustive_cfg).unwrap();

        assert_eq!(pruned.offset_windows, exhaustive.offset_windows);
        assert!((pruned.distance - exhaustive.distance).abs() < 1e-12);
    }

    #[test]
    fn test_silent_audio_still_matches_through_visual() {
        let mut rng = StdRng::seed_from_u64(8);
        let visual = random_visual_fingerprint(&mut rng, 30, 2.0);

        let silent_cand = AudioFingerprint::all_silent(600, 0.1);
        let silent_query = AudioFingerprint::new(vec![AudioWindow::silent(); 100], 0.1);

        let query = query_from(&silent_query, &visual_slice(&visual, 10, 5));
        let candidates = [CandidateFingerprints {
            id: "mute",
            audio: &silent_cand,
            visual: &visual,
        }];

        let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();
        assert_eq!(best.id, "mute");
        // visual places the clip at chunk 10 = window 200
        assert_eq!(best.offset_windows, 200);
    }
}
