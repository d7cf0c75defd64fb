use std::sync::Arc;
use std::time::Duration;

use vidseek::search::embeddings::{Encoder, HashEmbedder};
use vidseek::search::index::{BuildOptions, EmbeddingIndex, UpsertOutcome};
use vidseek::test_utils::encoders::{CountingEncoder, FixedEncoder};
use vidseek::test_utils::fixtures::{sample_record, topic_records};

const TIMEOUT: Duration = Duration::from_secs(5);

fn counting_index(dims: usize) -> (Arc<CountingEncoder<HashEmbedder>>, EmbeddingIndex) {
    let encoder = Arc::new(CountingEncoder::new(HashEmbedder::new(dims)));
    let index = EmbeddingIndex::in_memory(Arc::clone(&encoder) as Arc<dyn Encoder>, TIMEOUT);
    (encoder, index)
}

#[test]
fn test_upsert_twice_does_not_reencode() {
    let (encoder, index) = counting_index(32);
    assert_eq!(
        index.upsert("v1", "rust borrow checker").unwrap(),
        UpsertOutcome::Inserted
    );
    let before = index.get("v1").unwrap();

    assert_eq!(
        index.upsert("v1", "rust borrow checker").unwrap(),
        UpsertOutcome::Unchanged
    );
    let after = index.get("v1").unwrap();

    assert_eq!(encoder.calls(), 1);
    assert_eq!(before.source_text_hash, after.source_text_hash);
    assert_eq!(before.embedding, after.embedding);
}

#[test]
fn test_changed_text_replaces_entry() {
    let (encoder, index) = counting_index(32);
    index.upsert("v1", "rust borrow checker").unwrap();
    let old_hash = index.get("v1").unwrap().source_text_hash.clone();

    assert_eq!(
        index.upsert("v1", "python generators").unwrap(),
        UpsertOutcome::Updated
    );
    assert_eq!(encoder.calls(), 2);
    assert_eq!(index.len(), 1);
    assert_ne!(index.get("v1").unwrap().source_text_hash, old_hash);
}

#[test]
fn test_rebuild_with_unchanged_records_is_identical() {
    let (encoder, index) = counting_index(64);
    let records = topic_records();
    index.build(&records, BuildOptions::default(), |_| {}).unwrap();
    let first = index.snapshot();
    let calls = encoder.calls();

    let report = index.build(&records, BuildOptions::default(), |_| {}).unwrap();
    let second = index.snapshot();

    assert_eq!(report.unchanged, records.len());
    assert_eq!(report.indexed, 0);
    assert_eq!(encoder.calls(), calls);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.video_id, b.video_id);
        assert_eq!(a.source_text_hash, b.source_text_hash);
        let a_bytes: Vec<u32> = a.embedding.iter().map(|x| x.to_bits()).collect();
        let b_bytes: Vec<u32> = b.embedding.iter().map(|x| x.to_bits()).collect();
        assert_eq!(a_bytes, b_bytes);
    }
}

#[test]
fn test_prune_drops_records_missing_from_batch() {
    let index = EmbeddingIndex::in_memory(Arc::new(HashEmbedder::new(32)), TIMEOUT);
    index
        .build(&topic_records(), BuildOptions::default(), |_| {})
        .unwrap();

    let keep = vec![sample_record("vid-01", "rust ownership")];
    let report = index.build(&keep, BuildOptions { prune: true }, |_| {}).unwrap();

    assert_eq!(report.removed, 9);
    assert_eq!(index.len(), 1);
    assert!(index.get("vid-01").is_some());
}

#[test]
fn test_equal_scores_break_ties_by_video_id() {
    let encoder = FixedEncoder::new(2)
        .with("left", vec![1.0, 0.0])
        .with("right", vec![0.0, 1.0]);
    let index = EmbeddingIndex::in_memory(Arc::new(encoder), TIMEOUT);
    for id in ["zeta", "alpha", "mid"] {
        index.upsert(id, "left").unwrap();
    }
    index.upsert("other", "right").unwrap();

    let results = index.search(&[1.0, 0.0], 4).unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.video_id.as_str()).collect();
    assert_eq!(ids, ["alpha", "mid", "zeta", "other"]);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_remove_then_search_excludes_video() {
    let index = EmbeddingIndex::in_memory(Arc::new(HashEmbedder::new(32)), TIMEOUT);
    index
        .build(&topic_records(), BuildOptions::default(), |_| {})
        .unwrap();
    assert!(index.remove("vid-03").unwrap());
    assert!(!index.remove("vid-03").unwrap());

    let query = index.get("vid-04").unwrap().embedding.clone();
    let results = index.search(&query, 10).unwrap();
    assert_eq!(results.len(), 9);
    assert!(results.iter().all(|r| r.video_id != "vid-03"));
    assert_eq!(results[0].video_id, "vid-04");
}
