//! Modality encoders and vector math
//!
//! Every encoder produces vectors for one shared comparison space of
//! dimension D. Encoders whose native space differs are wrapped in a
//! [`ProjectedEncoder`] that maps them into D with a fixed linear map.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EncodingError, EncodingFailure, Result, SeekError};

/// Numeric tolerance for the unit-norm invariant
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// Input kinds a query can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Document,
}

impl Modality {
    pub const ALL: [Self; 3] = [Self::Text, Self::Image, Self::Document];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability shared by every encoder backend.
///
/// Implementations must be idempotent and must not touch engine state;
/// the same input always yields the same vector.
pub trait Encoder: Send + Sync {
    /// Modality of the raw input this encoder accepts.
    ///
    /// Document queries use the `Text` encoder after extraction.
    fn modality(&self) -> Modality;

    /// Length of every vector this encoder returns
    fn dims(&self) -> usize;

    /// Human-readable backend name (for logs and index metadata)
    fn name(&self) -> &str;

    /// Encode raw text, or an image reference for image encoders
    fn encode(&self, input: &str) -> std::result::Result<Vec<f32>, EncodingError>;
}

// =============================================================================
// VECTOR MATH
// =============================================================================

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale `v` to unit length. Returns `None` for zero or non-finite vectors.
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Cosine similarity, clamped to [-1, 1]. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Element-wise mean of equally sized vectors
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut acc = vec![0.0f32; first.len()];
    for v in vectors {
        if v.len() != acc.len() {
            return None;
        }
        for (slot, x) in acc.iter_mut().zip(v) {
            *slot += x;
        }
    }
    let count = vectors.len() as f32;
    for slot in &mut acc {
        *slot /= count;
    }
    Some(acc)
}

/// Reject encoder output that breaks the D-dimensional, finite, unit-norm contract.
pub fn check_output(
    modality: Modality,
    expected_dims: usize,
    vector: Vec<f32>,
) -> std::result::Result<Vec<f32>, EncodingError> {
    if vector.len() != expected_dims {
        return Err(EncodingError::new(
            modality,
            EncodingFailure::Backend,
            format!("encoder returned {} dims, expected {expected_dims}", vector.len()),
        ));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(EncodingError::new(
            modality,
            EncodingFailure::Backend,
            "encoder returned non-finite values",
        ));
    }
    if is_unit(&vector) {
        return Ok(vector);
    }
    normalize(&vector).ok_or_else(|| {
        EncodingError::new(modality, EncodingFailure::Backend, "encoder returned a zero vector")
    })
}

// =============================================================================
// TIMEOUT GUARD
// =============================================================================

/// Run one encoding call with a deadline.
///
/// The call runs on a helper thread; if the deadline passes first the
/// thread is left to finish on its own and `Timeout` is returned.
pub fn encode_with_timeout(
    encoder: &Arc<dyn Encoder>,
    input: &str,
    timeout: Duration,
) -> std::result::Result<Vec<f32>, EncodingError> {
    let modality = encoder.modality();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker = Arc::clone(encoder);
    let owned = input.to_owned();

    std::thread::Builder::new()
        .name("vidseek-encode".to_string())
        .spawn(move || {
            let _ = tx.send(worker.encode(&owned));
        })
        .map_err(|err| {
            EncodingError::new(modality, EncodingFailure::Backend, format!("spawn encoder: {err}"))
        })?;

    let raw = match rx.recv_timeout(timeout) {
        Ok(result) => result?,
        Err(RecvTimeoutError::Timeout) => {
            return Err(EncodingError::new(
                modality,
                EncodingFailure::Timeout,
                format!("no result within {}ms", timeout.as_millis()),
            ));
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(EncodingError::new(
                modality,
                EncodingFailure::Backend,
                "encoder thread exited without a result",
            ));
        }
    };
    check_output(modality, encoder.dims(), raw)
}

// =============================================================================
// LONG TEXT POOLING
// =============================================================================

/// Texts longer than this are encoded as sentence chunks and mean-pooled
pub const LONG_TEXT_CHARS: usize = 10_000;

/// Word budget per chunk
pub const CHUNK_MAX_WORDS: usize = 512;

/// Split text into sentence-bounded chunks of at most `max_words` words.
///
/// A single sentence longer than the budget becomes its own chunk.
pub fn chunk_sentences(text: &str, max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in text.split(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let words = sentence.split_whitespace().count();
        if current_words + words > max_words && !current.is_empty() {
            chunks.push(current.join(". "));
            current.clear();
            current_words = 0;
        }
        current.push(sentence);
        current_words += words;
    }
    if !current.is_empty() {
        chunks.push(current.join(". "));
    }
    chunks
}

/// Encode a text blob, mean-pooling sentence chunks when it is long.
///
/// `timeout` bounds the whole blob, not each chunk.
pub fn encode_text_blob(
    encoder: &Arc<dyn Encoder>,
    text: &str,
    timeout: Duration,
) -> std::result::Result<Vec<f32>, EncodingError> {
    if text.chars().count() <= LONG_TEXT_CHARS {
        return encode_with_timeout(encoder, text, timeout);
    }

    let chunks = chunk_sentences(text, CHUNK_MAX_WORDS);
    debug!(chunks = chunks.len(), "pooling long text");
    let deadline = Instant::now() + timeout;
    let vectors = chunks
        .iter()
        .map(|chunk| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EncodingError::new(
                    encoder.modality(),
                    EncodingFailure::Timeout,
                    format!("no result within {}ms", timeout.as_millis()),
                ));
            }
            encode_with_timeout(encoder, chunk, remaining)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let pooled = mean_pool(&vectors).ok_or_else(|| EncodingError::empty_input(encoder.modality()))?;
    check_output(encoder.modality(), encoder.dims(), pooled)
}

// =============================================================================
// HASH EMBEDDER
// =============================================================================

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;
const BIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic local text encoder using FNV-1a feature hashing.
///
/// Lowercased word unigrams and bigrams are hashed into signed buckets.
/// No model files, no network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

impl HashEmbedder {
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn add_feature(&self, acc: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dim as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        acc[bucket] += sign * weight;
    }

    /// Raw (unnormalized) hashed feature vector
    pub fn features(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dim];
        if self.dim == 0 {
            return acc;
        }
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut acc, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut acc, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }
        if tokens.is_empty() {
            // punctuation-only input still gets a stable direction
            self.add_feature(&mut acc, text.trim(), 1.0);
        }
        acc
    }
}

impl Encoder for HashEmbedder {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    fn dims(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "hash-fnv1a"
    }

    fn encode(&self, input: &str) -> std::result::Result<Vec<f32>, EncodingError> {
        if input.trim().is_empty() {
            return Err(EncodingError::empty_input(Modality::Text));
        }
        normalize(&self.features(input)).ok_or_else(|| {
            EncodingError::new(
                Modality::Text,
                EncodingFailure::Backend,
                "hashed features cancelled to a zero vector",
            )
        })
    }
}

// =============================================================================
// PROJECTION
// =============================================================================

/// Seed of the default projection matrices
pub const DEFAULT_PROJECTION_SEED: u64 = 0x5EED_0F_71DE0;

/// Fixed linear map from an encoder's native space into the shared space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub input_dims: usize,
    pub output_dims: usize,
    /// Row-major `output_dims x input_dims`
    pub weights: Vec<Vec<f32>>,
}

impl Projection {
    /// Gaussian random projection, identical for identical arguments
    pub fn seeded(input_dims: usize, output_dims: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let std_dev = 1.0 / (output_dims.max(1) as f32).sqrt();
        let normal = Normal::new(0.0f32, std_dev)
            .map_err(|err| SeekError::Config(format!("projection distribution: {err}")))?;
        let weights = (0..output_dims)
            .map(|_| (0..input_dims).map(|_| normal.sample(&mut rng)).collect())
            .collect();
        Ok(Self {
            input_dims,
            output_dims,
            weights,
        })
    }

    /// Load a matrix configured offline
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SeekError::Config(format!("read projection {}: {err}", path.display()))
        })?;
        let projection: Self = serde_json::from_str(&raw).map_err(|err| {
            SeekError::Config(format!("parse projection {}: {err}", path.display()))
        })?;
        projection.validate()?;
        Ok(projection)
    }

    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != self.output_dims {
            return Err(SeekError::InvalidDimension {
                expected: self.output_dims,
                actual: self.weights.len(),
            });
        }
        if let Some(row) = self.weights.iter().find(|row| row.len() != self.input_dims) {
            return Err(SeekError::InvalidDimension {
                expected: self.input_dims,
                actual: row.len(),
            });
        }
        Ok(())
    }

    pub fn apply(&self, v: &[f32]) -> Vec<f32> {
        self.weights.iter().map(|row| dot(row, v)).collect()
    }
}

/// Encoder wrapper that projects native vectors into the shared space
pub struct ProjectedEncoder {
    inner: Arc<dyn Encoder>,
    projection: Projection,
    name: String,
}

impl ProjectedEncoder {
    pub fn new(inner: Arc<dyn Encoder>, projection: Projection) -> Result<Self> {
        projection.validate()?;
        if inner.dims() != projection.input_dims {
            return Err(SeekError::InvalidDimension {
                expected: projection.input_dims,
                actual: inner.dims(),
            });
        }
        let name = format!("{}+proj{}", inner.name(), projection.output_dims);
        Ok(Self {
            inner,
            projection,
            name,
        })
    }
}

impl Encoder for ProjectedEncoder {
    fn modality(&self) -> Modality {
        self.inner.modality()
    }

    fn dims(&self) -> usize {
        self.projection.output_dims
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, input: &str) -> std::result::Result<Vec<f32>, EncodingError> {
        let native = self.inner.encode(input)?;
        let native = check_output(self.inner.modality(), self.inner.dims(), native)?;
        normalize(&self.projection.apply(&native)).ok_or_else(|| {
            EncodingError::new(
                self.modality(),
                EncodingFailure::Backend,
                "projection produced a zero vector",
            )
        })
    }
}

// =============================================================================
// ENCODER SET
// =============================================================================

/// The encoders available to the engine, selected by modality tag.
///
/// Built once and passed in explicitly; dropping it releases the backends.
#[derive(Clone)]
pub struct EncoderSet {
    text: Arc<dyn Encoder>,
    image: Option<Arc<dyn Encoder>>,
    dims: usize,
    timeout: Duration,
}

impl EncoderSet {
    /// Every encoder must already emit vectors of `dims`
    pub fn new(
        dims: usize,
        text: Arc<dyn Encoder>,
        image: Option<Arc<dyn Encoder>>,
        timeout: Duration,
    ) -> Result<Self> {
        for encoder in std::iter::once(&text).chain(image.as_ref()) {
            if encoder.dims() != dims {
                return Err(SeekError::InvalidDimension {
                    expected: dims,
                    actual: encoder.dims(),
                });
            }
        }
        Ok(Self {
            text,
            image,
            dims,
            timeout,
        })
    }

    pub const fn dims(&self) -> usize {
        self.dims
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn text(&self) -> &Arc<dyn Encoder> {
        &self.text
    }

    /// Encoder serving a query modality; documents share the text encoder
    pub fn for_modality(&self, modality: Modality) -> Option<&Arc<dyn Encoder>> {
        match modality {
            Modality::Text | Modality::Document => Some(&self.text),
            Modality::Image => self.image.as_ref(),
        }
    }

    /// Encode with the configured timeout, attributing failures to `modality`
    pub fn encode(
        &self,
        modality: Modality,
        input: &str,
    ) -> std::result::Result<Vec<f32>, EncodingError> {
        let encoder = self.for_modality(modality).ok_or_else(|| {
            EncodingError::new(
                modality,
                EncodingFailure::UnsupportedFormat,
                format!("no {modality} encoder configured"),
            )
        })?;
        encode_with_timeout(encoder, input, self.timeout).map_err(|err| err.with_modality(modality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::encoders::SlowEncoder;

    #[test]
    fn test_hash_embedding_is_unit_and_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.encode("machine learning tutorial").unwrap();
        let b = embedder.encode("machine learning tutorial").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(is_unit(&a));
    }

    #[test]
    fn test_hash_embedding_case_insensitive() {
        let embedder = HashEmbedder::new(128);
        assert_eq!(
            embedder.encode("Deep Learning").unwrap(),
            embedder.encode("deep learning").unwrap()
        );
    }

    #[test]
    fn test_hash_embedding_rejects_blank() {
        let err = HashEmbedder::new(32).encode("   \n\t").unwrap_err();
        assert_eq!(err.kind, EncodingFailure::EmptyInput);
        assert_eq!(err.modality, Modality::Text);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashEmbedder::new(384);
        let query = embedder.encode("rust async programming").unwrap();
        let near = embedder.encode("async programming in rust with tokio").unwrap();
        let far = embedder.encode("baking sourdough bread at home").unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let v = normalize(&[0.3, -0.4, 1.2]).unwrap();
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert!(normalize(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_mean_pool() {
        let pooled = mean_pool(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(pooled, vec![0.5, 0.5]);
        assert!(mean_pool(&[]).is_none());
        assert!(mean_pool(&[vec![1.0], vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_chunk_sentences_respects_budget() {
        let text = "one two three. four five. six seven eight nine.";
        let chunks = chunk_sentences(text, 5);
        assert_eq!(chunks, vec!["one two three. four five", "six seven eight nine"]);
    }

    #[test]
    fn test_long_blob_is_pooled_and_unit() {
        let encoder: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(64));
        let sentence = "transformers attend over tokens in parallel. ";
        let blob = sentence.repeat(400);
        assert!(blob.chars().count() > LONG_TEXT_CHARS);
        let v = encode_text_blob(&encoder, &blob, Duration::from_secs(5)).unwrap();
        assert!(is_unit(&v));
    }

    #[test]
    fn test_projection_is_deterministic() {
        let a = Projection::seeded(8, 4, 7).unwrap();
        let b = Projection::seeded(8, 4, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.apply(&[1.0; 8]).len(), 4);
    }

    #[test]
    fn test_projected_encoder_dims() {
        let inner: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(16));
        let projected = ProjectedEncoder::new(inner, Projection::seeded(16, 8, 1).unwrap()).unwrap();
        let v = projected.encode("hello world").unwrap();
        assert_eq!(v.len(), 8);
        assert!(is_unit(&v));
    }

    #[test]
    fn test_projected_encoder_rejects_mismatch() {
        let inner: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(16));
        let err = ProjectedEncoder::new(inner, Projection::seeded(12, 8, 1).unwrap()).err();
        assert!(matches!(
            err,
            Some(SeekError::InvalidDimension {
                expected: 12,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_encoder_set_checks_dims() {
        let text: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(16));
        let result = EncoderSet::new(32, text, None, Duration::from_secs(1));
        assert!(matches!(result, Err(SeekError::InvalidDimension { .. })));
    }

    #[test]
    fn test_encoder_set_missing_image_encoder() {
        let text: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(16));
        let set = EncoderSet::new(16, text, None, Duration::from_secs(1)).unwrap();
        let err = set.encode(Modality::Image, "cat.png").unwrap_err();
        assert_eq!(err.modality, Modality::Image);
        assert_eq!(err.kind, EncodingFailure::UnsupportedFormat);
    }

    #[test]
    fn test_slow_encoder_times_out() {
        let slow: Arc<dyn Encoder> = Arc::new(SlowEncoder::new(
            HashEmbedder::new(16),
            Duration::from_millis(500),
        ));
        let err = encode_with_timeout(&slow, "hello", Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.kind, EncodingFailure::Timeout);
        assert_eq!(err.modality, Modality::Text);
    }

    #[test]
    fn test_fast_encoder_beats_deadline() {
        let slow: Arc<dyn Encoder> = Arc::new(SlowEncoder::new(
            HashEmbedder::new(16),
            Duration::from_millis(1),
        ));
        let v = encode_with_timeout(&slow, "hello", Duration::from_secs(5)).unwrap();
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn test_long_blob_shares_one_deadline() {
        let slow: Arc<dyn Encoder> = Arc::new(SlowEncoder::new(
            HashEmbedder::new(16),
            Duration::from_millis(40),
        ));
        let blob = "alpha beta gamma delta. ".repeat(600);
        assert!(chunk_sentences(&blob, CHUNK_MAX_WORDS).len() >= 4);

        let err = encode_text_blob(&slow, &blob, Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.kind, EncodingFailure::Timeout);

        let pooled = encode_text_blob(&slow, &blob, Duration::from_secs(5)).unwrap();
        assert!(is_unit(&pooled));
    }

    #[test]
    fn test_document_failures_are_relabelled() {
        let text: Arc<dyn Encoder> = Arc::new(HashEmbedder::new(16));
        let set = EncoderSet::new(16, text, None, Duration::from_secs(1)).unwrap();
        let err = set.encode(Modality::Document, "  ").unwrap_err();
        assert_eq!(err.modality, Modality::Document);
        assert_eq!(err.kind, EncodingFailure::EmptyInput);
    }
}
