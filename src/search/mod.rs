//! Multimodal retrieval
//!
//! Encoders map text, images and documents into one vector space; the
//! fusion engine combines a query's modalities and the ranker scores the
//! fused vector against the embedding index.

use sha2::{Digest, Sha256};

pub mod cache;
pub mod embeddings;
pub mod extract;
pub mod fusion;
pub mod index;
pub mod ranker;
pub mod remote;
pub mod visual;

pub use embeddings::{Encoder, EncoderSet, HashEmbedder, Modality, ProjectedEncoder, Projection};
pub use extract::{DocumentExtractor, FileExtractor};
pub use fusion::{FusedQuery, FusionEngine, ModalityWeights, QueryInput};
pub use index::{BuildOptions, BuildReport, EmbeddingIndex, IndexEntry, SearchResult};
pub use ranker::{Ranker, SearchEngine, SearchOptions, SearchOutcome};

/// Hex SHA-256 of a text blob
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
