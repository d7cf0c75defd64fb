//! Query fusion
//!
//! A [`QueryInput`] carries any non-empty subset of text, a document path
//! and an image reference. Each present signal is encoded on its own; the
//! ones that succeed are combined as `normalize(Σ w_m · v_m)` with weights
//! renormalized over the modalities that actually encoded. Failed signals
//! are reported back as dropped modalities instead of aborting the query.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DroppedModality, FusionError, Result, SeekError};
use crate::search::cache::QueryCache;
use crate::search::embeddings::{EncoderSet, Modality, normalize};
use crate::search::extract::{DEFAULT_MAX_DOCUMENT_CHARS, DocumentExtractor, truncate_chars};

/// What the caller is searching with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryInput {
    pub text: Option<String>,
    pub file_path: Option<PathBuf>,
    pub image_ref: Option<String>,
}

impl QueryInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn document(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn image(image_ref: impl Into<String>) -> Self {
        Self {
            image_ref: Some(image_ref.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_document(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// At least one field must be set.
    pub fn validate(&self) -> Result<()> {
        if self.text.is_none() && self.file_path.is_none() && self.image_ref.is_none() {
            return Err(SeekError::InvalidQuery(
                "query needs text, a document or an image".to_string(),
            ));
        }
        Ok(())
    }

    fn signals(&self) -> Vec<QuerySignal<'_>> {
        let text = self.text.as_deref().map(QuerySignal::Text);
        let image = self.image_ref.as_deref().map(QuerySignal::Image);
        let document = self.file_path.as_deref().map(QuerySignal::Document);
        [text, image, document].into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum QuerySignal<'a> {
    Text(&'a str),
    Image(&'a str),
    Document(&'a Path),
}

impl QuerySignal<'_> {
    const fn modality(self) -> Modality {
        match self {
            Self::Text(_) => Modality::Text,
            Self::Image(_) => Modality::Image,
            Self::Document(_) => Modality::Document,
        }
    }
}

/// Relative weight per modality; renormalized over the modalities used
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityWeights {
    pub text: f32,
    pub image: f32,
    pub document: f32,
}

impl Default for ModalityWeights {
    fn default() -> Self {
        Self {
            text: 1.0,
            image: 1.0,
            document: 1.0,
        }
    }
}

impl ModalityWeights {
    pub const fn get(&self, modality: Modality) -> f32 {
        match modality {
            Modality::Text => self.text,
            Modality::Image => self.image,
            Modality::Document => self.document,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for modality in Modality::ALL {
            let w = self.get(modality);
            if !w.is_finite() || w < 0.0 {
                return Err(SeekError::Config(format!(
                    "weight for {modality} must be a finite, non-negative number (got {w})"
                )));
            }
        }
        Ok(())
    }
}

/// One encoded modality and its effective (renormalized) weight
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModalityVector {
    pub modality: Modality,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedQuery {
    /// Unit-length query vector
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub used: Vec<ModalityVector>,
    pub dropped: Vec<DroppedModality>,
}

impl FusedQuery {
    pub fn modalities(&self) -> Vec<Modality> {
        self.used.iter().map(|m| m.modality).collect()
    }
}

pub struct FusionEngine {
    encoders: EncoderSet,
    extractor: Arc<dyn DocumentExtractor>,
    weights: ModalityWeights,
    max_document_chars: usize,
    cache: Option<Arc<QueryCache>>,
}

impl FusionEngine {
    pub fn new(encoders: EncoderSet, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            encoders,
            extractor,
            weights: ModalityWeights::default(),
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_weights(mut self, weights: ModalityWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_max_document_chars(mut self, max_chars: usize) -> Self {
        self.max_document_chars = max_chars;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub const fn dims(&self) -> usize {
        self.encoders.dims()
    }

    pub const fn weights(&self) -> &ModalityWeights {
        &self.weights
    }

    pub fn fuse(&self, query: &QueryInput) -> Result<FusedQuery> {
        self.fuse_weighted(query, &self.weights)
    }

    /// Fuse with caller-supplied weights instead of the configured ones.
    pub fn fuse_weighted(&self, query: &QueryInput, weights: &ModalityWeights) -> Result<FusedQuery> {
        query.validate()?;
        weights.validate()?;

        let (encoded, dropped) = query.signals().into_iter().fold(
            (Vec::<(Modality, Vec<f32>)>::new(), Vec::<DroppedModality>::new()),
            |(mut encoded, mut dropped), signal| {
                match self.encode_signal(signal) {
                    Ok(vector) => encoded.push((signal.modality(), vector)),
                    Err(reason) => {
                        warn!(
                            modality = %reason.modality,
                            code = %reason.code,
                            "dropping query modality"
                        );
                        dropped.push(reason);
                    }
                }
                (encoded, dropped)
            },
        );

        if encoded.is_empty() {
            return Err(FusionError::NoUsableSignal { dropped }.into());
        }

        let effective = effective_weights(&encoded, weights);
        let vector = if let [(_, only)] = encoded.as_slice() {
            only.clone()
        } else {
            let mut sum = vec![0.0f32; self.dims()];
            for ((_, v), w) in encoded.iter().zip(&effective) {
                for (acc, x) in sum.iter_mut().zip(v) {
                    *acc += w * x;
                }
            }
            // opposing signals can cancel out entirely
            normalize(&sum).ok_or_else(|| FusionError::NoUsableSignal {
                dropped: dropped.clone(),
            })?
        };

        let used: Vec<ModalityVector> = encoded
            .into_iter()
            .zip(effective)
            .map(|((modality, vector), weight)| ModalityVector {
                modality,
                vector,
                weight,
            })
            .collect();
        debug!(
            used = ?used.iter().map(|m| m.modality).collect::<Vec<_>>(),
            dropped = dropped.len(),
            "fused query"
        );

        Ok(FusedQuery {
            vector,
            used,
            dropped,
        })
    }

    fn encode_signal(&self, signal: QuerySignal<'_>) -> std::result::Result<Vec<f32>, DroppedModality> {
        match signal {
            QuerySignal::Text(text) => self.encode_cached(Modality::Text, text),
            QuerySignal::Image(image_ref) => Ok(self.encoders.encode(Modality::Image, image_ref)?),
            QuerySignal::Document(path) => {
                let text = self
                    .extractor
                    .extract_text(path)
                    .map_err(|err| DroppedModality::from_extraction(&err))?;
                self.encode_cached(
                    Modality::Document,
                    truncate_chars(&text, self.max_document_chars),
                )
            }
        }
    }

    fn encode_cached(
        &self,
        modality: Modality,
        input: &str,
    ) -> std::result::Result<Vec<f32>, DroppedModality> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(modality, input)) {
            return Ok(hit);
        }
        let vector = self.encoders.encode(modality, input)?;
        if let Some(cache) = &self.cache {
            cache.put(modality, input, vector.clone());
        }
        Ok(vector)
    }
}

/// `w_m / Σ w` over the encoded modalities; equal weights when the sum is zero
fn effective_weights(encoded: &[(Modality, Vec<f32>)], weights: &ModalityWeights) -> Vec<f32> {
    let raw: Vec<f32> = encoded.iter().map(|(m, _)| weights.get(*m)).collect();
    let total: f32 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else {
        let equal = 1.0 / encoded.len() as f32;
        vec![equal; encoded.len()]
    }
}
