use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use vidseek::search::embeddings::HashEmbedder;
use vidseek::search::index::EmbeddingIndex;

fn corpus() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map("[a-z]{1,6}", "[a-z]{2,8}( [a-z]{2,8}){0,4}", 1..20)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_search_orders_by_score_then_id(
        docs in corpus(),
        query in "[a-z]{2,8}( [a-z]{2,8}){0,4}",
        top_k in 1usize..30,
    ) {
        let embedder = Arc::new(HashEmbedder::new(32));
        let index = EmbeddingIndex::in_memory(embedder.clone(), Duration::from_secs(5));
        for (id, text) in &docs {
            index.upsert(id, text).unwrap();
        }
        let query_vec = vidseek::search::Encoder::encode(embedder.as_ref(), &query).unwrap();
        let results = index.search(&query_vec, top_k).unwrap();

        prop_assert_eq!(results.len(), top_k.min(docs.len()));
        for (idx, pair) in results.windows(2).enumerate() {
            prop_assert!(pair[0].score >= pair[1].score, "scores out of order at {}", idx);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].video_id < pair[1].video_id);
            }
        }
        for (idx, result) in results.iter().enumerate() {
            prop_assert_eq!(result.rank, idx + 1);
            prop_assert!((-1.0..=1.0).contains(&result.score));
        }
    }
}
