use std::path::Path;

use vid_clip_finder_lib::test_util::FakeMedia;
use vid_clip_finder_lib::*;

fn extract(extractor: &Extractor<FakeMedia>, name: &str) -> (AudioFingerprint, VisualFingerprint) {
    extractor
        .extract_both(Path::new(name), &CancelToken::new())
        .unwrap()
}

/// The headline scenario: a collection holds a 60s video and a 90s video;
/// a 5s clip taken verbatim from the second at 40s must come back as that
/// video at (about) 40s.
#[test]
fn test_clip_is_located_in_its_source_video() {
    let mut media = FakeMedia::new();
    media.add_video("a.mp4", 1, 60.0);
    media.add_video("b.mp4", 2, 90.0);
    media.add_clip_of("clip.mp4", 2, 40.0, 5.0);

    let extractor = Extractor::new(media);

    let (a_audio, a_visual) = extract(&extractor, "a.mp4");
    let (b_audio, b_visual) = extract(&extractor, "b.mp4");
    let (clip_audio, clip_visual) = extract(&extractor, "clip.mp4");

    let query = QueryFingerprints {
        audio: clip_audio,
        visual: clip_visual,
    };
    let candidates = [
        CandidateFingerprints {
            id: "a",
            audio: &a_audio,
            visual: &a_visual,
        },
        CandidateFingerprints {
            id: "b",
            audio: &b_audio,
            visual: &b_visual,
        },
    ];

    let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();

    assert_eq!(best.id, "b");
    assert!(
        (best.offset_secs - 40.0).abs() <= DEFAULT_WINDOW_SECS + 1e-9,
        "offset: {}",
        best.offset_secs
    );
    assert!(!best.ambiguous);
    assert!(best.confidence > 0.5, "confidence: {}", best.confidence);
}

/// Matching a video's own full fingerprints against the store finds that
/// video at offset zero with zero distance.
#[test]
fn test_self_query_is_exact() {
    let mut media = FakeMedia::new();
    media.add_video("a.mp4", 1, 60.0);
    media.add_video("b.mp4", 2, 90.0);

    let extractor = Extractor::new(media);

    let (a_audio, a_visual) = extract(&extractor, "a.mp4");
    let (b_audio, b_visual) = extract(&extractor, "b.mp4");

    let query = QueryFingerprints {
        audio: b_audio.clone(),
        visual: b_visual.clone(),
    };
    let candidates = [
        CandidateFingerprints {
            id: "a",
            audio: &a_audio,
            visual: &a_visual,
        },
        CandidateFingerprints {
            id: "b",
            audio: &b_audio,
            visual: &b_visual,
        },
    ];

    let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();

    assert_eq!(best.id, "b");
    assert_eq!(best.offset_windows, 0);
    assert!(best.distance < 1e-12);
    assert!(!best.ambiguous);
}

/// A query fingerprinted on a different window grid is rejected, not
/// silently mis-aligned.
#[test]
fn test_mismatched_extraction_config_is_rejected() {
    let mut media = FakeMedia::new();
    media.add_video("a.mp4", 1, 60.0);
    media.add_clip_of("clip.mp4", 1, 10.0, 5.0);

    let indexed = Extractor::new(media.clone());
    let (a_audio, a_visual) = extract(&indexed, "a.mp4");

    let other_cfg = ExtractorCfg {
        window_secs: 0.25,
        ..ExtractorCfg::default()
    };
    let querying = Extractor::with_cfg(media, other_cfg);
    let (clip_audio, clip_visual) = extract(&querying, "clip.mp4");

    let query = QueryFingerprints {
        audio: clip_audio,
        visual: clip_visual,
    };
    let candidates = [CandidateFingerprints {
        id: "a",
        audio: &a_audio,
        visual: &a_visual,
    }];

    let result = find_best_alignment(&query, &candidates, &MatchConfig::default());
    assert!(matches!(result, Err(MatchError::IncompatibleFingerprint(_))));
}

/// Repeated extraction of the same media yields bit-identical fingerprints,
/// so offsets computed at index time and query time stay comparable.
#[test]
fn test_extraction_is_reproducible_across_runs() {
    let mut media = FakeMedia::new();
    media.add_video("a.mp4", 7, 30.0);

    let first = extract(&Extractor::new(media.clone()), "a.mp4");
    let second = extract(&Extractor::new(media), "a.mp4");

    assert_eq!(first, second);
}
