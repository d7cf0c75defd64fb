//! Deterministic encoder and extractor doubles.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{EncodingError, EncodingFailure, ExtractionError, ExtractionFailure};
use crate::search::embeddings::{Encoder, Modality};
use crate::search::extract::DocumentExtractor;

/// Returns a preset vector per exact input string.
#[derive(Debug, Clone)]
pub struct FixedEncoder {
    modality: Modality,
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEncoder {
    pub fn new(dims: usize) -> Self {
        Self {
            modality: Modality::Text,
            dims,
            vectors: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn for_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    #[must_use]
    pub fn with(mut self, input: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(input.to_string(), vector);
        self
    }
}

impl Encoder for FixedEncoder {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "fixed"
    }

    fn encode(&self, input: &str) -> Result<Vec<f32>, EncodingError> {
        if input.trim().is_empty() {
            return Err(EncodingError::empty_input(self.modality));
        }
        self.vectors.get(input).cloned().ok_or_else(|| {
            EncodingError::new(
                self.modality,
                EncodingFailure::Backend,
                format!("no fixture vector for {input:?}"),
            )
        })
    }
}

/// Always fails with the configured failure kind.
#[derive(Debug, Clone)]
pub struct FailingEncoder {
    modality: Modality,
    dims: usize,
    kind: EncodingFailure,
}

impl FailingEncoder {
    pub const fn new(modality: Modality, dims: usize, kind: EncodingFailure) -> Self {
        Self {
            modality,
            dims,
            kind,
        }
    }
}

impl Encoder for FailingEncoder {
    fn modality(&self) -> Modality {
        self.modality
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn encode(&self, _input: &str) -> Result<Vec<f32>, EncodingError> {
        Err(EncodingError::new(self.modality, self.kind, "injected failure"))
    }
}

/// Counts calls through to the wrapped encoder.
pub struct CountingEncoder<E> {
    inner: E,
    calls: AtomicUsize,
}

impl<E: Encoder> CountingEncoder<E> {
    pub const fn new(inner: E) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E: Encoder> Encoder for CountingEncoder<E> {
    fn modality(&self) -> Modality {
        self.inner.modality()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn encode(&self, input: &str) -> Result<Vec<f32>, EncodingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(input)
    }
}

/// Sleeps before delegating, for timeout tests.
pub struct SlowEncoder<E> {
    inner: E,
    delay: Duration,
}

impl<E: Encoder> SlowEncoder<E> {
    pub const fn new(inner: E, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<E: Encoder> Encoder for SlowEncoder<E> {
    fn modality(&self) -> Modality {
        self.inner.modality()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn name(&self) -> &str {
        "slow"
    }

    fn encode(&self, input: &str) -> Result<Vec<f32>, EncodingError> {
        std::thread::sleep(self.delay);
        self.inner.encode(input)
    }
}

/// Document extractor that ignores the path.
#[derive(Debug, Clone)]
pub enum StubExtractor {
    Text(String),
    Failing(ExtractionFailure),
}

impl StubExtractor {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub const fn failing(kind: ExtractionFailure) -> Self {
        Self::Failing(kind)
    }
}

impl DocumentExtractor for StubExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Failing(kind) => Err(ExtractionError::new(path, *kind, "injected failure")),
        }
    }
}
