//! Ranking and the search facade

use std::sync::Arc;

use serde::Serialize;

use crate::error::{DroppedModality, Result, SeekError};
use crate::search::fusion::{FusionEngine, ModalityVector, ModalityWeights, QueryInput};
use crate::search::index::{EmbeddingIndex, SearchResult};

/// Default number of results
pub const DEFAULT_TOP_K: usize = 5;
/// Upper bound on `top_k`
pub const DEFAULT_MAX_TOP_K: usize = 1000;

/// Validates `top_k`, runs the index search and applies the score floor
pub struct Ranker {
    index: Arc<EmbeddingIndex>,
    max_top_k: usize,
    min_score: f32,
}

impl Ranker {
    pub const fn new(index: Arc<EmbeddingIndex>) -> Self {
        Self {
            index,
            max_top_k: DEFAULT_MAX_TOP_K,
            min_score: -1.0,
        }
    }

    #[must_use]
    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k;
        self
    }

    /// Results below this score are dropped after top-k selection
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub const fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub const fn check_top_k(&self, top_k: usize) -> Result<()> {
        if top_k == 0 || top_k > self.max_top_k {
            return Err(SeekError::InvalidTopK {
                requested: top_k,
                max: self.max_top_k,
            });
        }
        Ok(())
    }

    pub fn rank(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.rank_with_floor(query, top_k, self.min_score)
    }

    /// Rank with a per-call score floor in place of the configured one
    pub fn rank_with_floor(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        self.check_top_k(top_k)?;
        check_min_score(min_score)?;
        let results = self.index.search(query, top_k)?;
        if min_score <= -1.0 {
            return Ok(results);
        }
        Ok(results
            .into_iter()
            .filter(|r| r.score >= min_score)
            .enumerate()
            .map(|(idx, mut r)| {
                r.rank = idx + 1;
                r
            })
            .collect())
    }
}

fn check_min_score(min_score: f32) -> Result<()> {
    if !(-1.0..=1.0).contains(&min_score) {
        return Err(SeekError::Config(format!(
            "min_score must be within [-1, 1] (got {min_score})"
        )));
    }
    Ok(())
}

/// Per-query overrides of the engine defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub weights: Option<ModalityWeights>,
}

impl SearchOptions {
    pub const fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            min_score: None,
            weights: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub used: Vec<ModalityVector>,
    /// Modalities present in the query that contributed nothing
    pub dropped: Vec<DroppedModality>,
}

/// Query in, ranked results out
pub struct SearchEngine {
    fusion: FusionEngine,
    ranker: Ranker,
}

impl SearchEngine {
    pub fn new(fusion: FusionEngine, ranker: Ranker) -> Result<Self> {
        let index_dims = ranker.index().dims();
        if fusion.dims() != index_dims {
            return Err(SeekError::InvalidDimension {
                expected: index_dims,
                actual: fusion.dims(),
            });
        }
        Ok(Self { fusion, ranker })
    }

    pub fn search(&self, query: &QueryInput, top_k: usize) -> Result<SearchOutcome> {
        self.search_with(query, &SearchOptions::top_k(top_k))
    }

    /// Validate the query, then `top_k`, then fuse and rank.
    pub fn search_with(&self, query: &QueryInput, options: &SearchOptions) -> Result<SearchOutcome> {
        query.validate()?;
        self.ranker.check_top_k(options.top_k)?;
        let weights = options.weights.as_ref().unwrap_or(self.fusion.weights());
        let fused = self.fusion.fuse_weighted(query, weights)?;
        let results = match options.min_score {
            Some(floor) => self.ranker.rank_with_floor(&fused.vector, options.top_k, floor)?,
            None => self.ranker.rank(&fused.vector, options.top_k)?,
        };
        Ok(SearchOutcome {
            results,
            used: fused.used,
            dropped: fused.dropped,
        })
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        self.ranker.index()
    }
}
