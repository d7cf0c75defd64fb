use std::sync::Arc;
use std::time::Duration;

use vidseek::SeekError;
use vidseek::error::{ExtractionFailure, FusionError};
use vidseek::search::embeddings::{EncoderSet, HashEmbedder, Modality};
use vidseek::search::extract::FileExtractor;
use vidseek::search::fusion::{FusionEngine, QueryInput};
use vidseek::search::index::EmbeddingIndex;
use vidseek::search::ranker::{Ranker, SearchEngine};
use vidseek::test_utils::encoders::{FixedEncoder, StubExtractor};
use vidseek::test_utils::fixtures::{UnitTestFixture, blank_record, topic_records};

const TIMEOUT: Duration = Duration::from_secs(5);

fn toy_encoder() -> FixedEncoder {
    FixedEncoder::new(2)
        .with("video a", vec![1.0, 0.0])
        .with("video b", vec![0.0, 1.0])
        .with("video c", vec![0.6, 0.8])
        .with("mostly b some a", vec![0.6, 0.8])
}

fn toy_engine(extractor: StubExtractor) -> SearchEngine {
    let index = EmbeddingIndex::in_memory(Arc::new(toy_encoder()), TIMEOUT);
    for (id, text) in [("A", "video a"), ("B", "video b"), ("C", "video c")] {
        index.upsert(id, text).unwrap();
    }
    let encoders = EncoderSet::new(2, Arc::new(toy_encoder()), None, TIMEOUT).unwrap();
    let fusion = FusionEngine::new(encoders, Arc::new(extractor));
    SearchEngine::new(fusion, Ranker::new(Arc::new(index))).unwrap()
}

#[test]
fn test_toy_space_text_search() {
    let engine = toy_engine(StubExtractor::text("unused"));
    let outcome = engine
        .search(&QueryInput::text("mostly b some a"), 2)
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].video_id, "C");
    assert!((outcome.results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(outcome.results[0].rank, 1);
    assert_eq!(outcome.results[1].video_id, "B");
    assert!((outcome.results[1].score - 0.8).abs() < 1e-6);
    assert_eq!(outcome.results[1].rank, 2);
}

#[test]
fn test_toy_space_search_is_deterministic() {
    let engine = toy_engine(StubExtractor::text("unused"));
    let query = QueryInput::text("mostly b some a");
    let first = engine.search(&query, 3).unwrap().results;
    let second = engine.search(&query, 3).unwrap().results;
    assert_eq!(first, second);
}

#[test]
fn test_unreadable_document_only_query_has_no_signal() {
    let engine = toy_engine(StubExtractor::failing(ExtractionFailure::UnreadableFile));
    let err = engine
        .search(&QueryInput::document("doc.pdf"), 2)
        .unwrap_err();

    match err {
        SeekError::Fusion(FusionError::NoUsableSignal { dropped }) => {
            assert_eq!(dropped.len(), 1);
            assert_eq!(dropped[0].modality, Modality::Document);
            assert_eq!(dropped[0].code, "UNREADABLE_FILE");
        }
        other => panic!("expected NoUsableSignal, got {other:?}"),
    }
}

#[test]
fn test_corrupt_pdf_on_disk_has_no_signal() {
    let fixture = UnitTestFixture::new();
    let pdf = fixture.create_file("doc.pdf", "this is not a pdf");

    let index = EmbeddingIndex::in_memory(Arc::new(HashEmbedder::new(32)), TIMEOUT);
    let encoders = EncoderSet::new(32, Arc::new(HashEmbedder::new(32)), None, TIMEOUT).unwrap();
    let fusion = FusionEngine::new(encoders, Arc::new(FileExtractor::new()));
    let engine = SearchEngine::new(fusion, Ranker::new(Arc::new(index))).unwrap();

    let err = engine.search(&QueryInput::document(pdf), 5).unwrap_err();
    assert_eq!(err.code(), "no_usable_signal");
}

#[test]
fn test_failed_document_is_dropped_when_text_survives() {
    let engine = toy_engine(StubExtractor::failing(ExtractionFailure::UnreadableFile));
    let query = QueryInput::text("video a").with_document("doc.pdf");
    let outcome = engine.search(&query, 1).unwrap();

    assert_eq!(outcome.results[0].video_id, "A");
    assert_eq!(outcome.dropped.len(), 1);
    assert_eq!(outcome.dropped[0].modality, Modality::Document);
    assert_eq!(outcome.used.len(), 1);
}

#[test]
fn test_batch_with_blank_record_skips_it() {
    let mut records = topic_records();
    records[3] = blank_record("vid-04");

    let index = EmbeddingIndex::in_memory(Arc::new(HashEmbedder::new(64)), TIMEOUT);
    let mut progress = Vec::new();
    let report = index
        .build(&records, Default::default(), |done| progress.push(done))
        .unwrap();

    assert_eq!(index.len(), 9);
    assert!(index.get("vid-04").is_none());
    assert_eq!(report.total, 10);
    assert_eq!(report.indexed, 9);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].position, 4);
    assert_eq!(report.skipped[0].video_id, "vid-04");
    assert_eq!(report.skipped[0].code, "EMPTY_INPUT");
    assert_eq!(progress, (1..=10).collect::<Vec<_>>());
}
