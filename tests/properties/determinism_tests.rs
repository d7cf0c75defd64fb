use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use vidseek::search::embeddings::{
    Encoder, EncoderSet, HashEmbedder, cosine_similarity, is_unit, normalize,
};
use vidseek::search::fusion::{FusionEngine, QueryInput};
use vidseek::search::content_hash;
use vidseek::test_utils::encoders::{FixedEncoder, StubExtractor};

fn unit_vector(dims: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, dims)
        .prop_filter_map("non-zero vector", |v| normalize(&v))
}

proptest! {
    #[test]
    fn test_hash_embedding_deterministic(text in "[a-z ]{1,80}") {
        let embedder = HashEmbedder::new(64);
        let first = embedder.encode(&text);
        let second = embedder.encode(&text);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_hash_embedding_is_unit(text in "[a-z]{1,20}( [a-z]{1,20}){0,10}", dim in 8usize..256usize) {
        let embedder = HashEmbedder::new(dim);
        let embedding = embedder.encode(&text).unwrap();
        prop_assert_eq!(embedding.len(), dim);
        prop_assert!(is_unit(&embedding));
    }

    #[test]
    fn test_cosine_of_unit_vectors_is_bounded(a in unit_vector(16), b in unit_vector(16)) {
        let score = cosine_similarity(&a, &b);
        prop_assert!((-1.0..=1.0).contains(&score));
        prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_modality_fusion_is_identity(v in unit_vector(8)) {
        let encoder = FixedEncoder::new(8).with("query", v.clone());
        let encoders = EncoderSet::new(8, Arc::new(encoder), None, Duration::from_secs(5)).unwrap();
        let fusion = FusionEngine::new(encoders, Arc::new(StubExtractor::text("unused")));
        let fused = fusion.fuse(&QueryInput::text("query")).unwrap();
        prop_assert_eq!(fused.vector, v);
    }

    #[test]
    fn test_content_hash_is_stable(text in ".*") {
        prop_assert_eq!(content_hash(&text), content_hash(&text));
        prop_assert_eq!(content_hash(&text).len(), 64);
    }
}
