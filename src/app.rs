use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SeekError};
use crate::search::cache::QueryCache;
use crate::search::embeddings::{
    DEFAULT_PROJECTION_SEED, Encoder, EncoderSet, HashEmbedder, ProjectedEncoder, Projection,
};
use crate::search::extract::FileExtractor;
use crate::search::fusion::FusionEngine;
use crate::search::index::EmbeddingIndex;
use crate::search::ranker::{Ranker, SearchEngine};
use crate::search::remote::HttpEmbedder;
use crate::search::visual::{IMAGE_FEATURE_DIMS, ImageEncoder};
use crate::storage::Database;

/// Everything a command needs, built once per process and dropped at exit.
pub struct AppContext {
    pub root: PathBuf,
    pub config: Config,
    pub index: Arc<EmbeddingIndex>,
    pub engine: SearchEngine,
    pub robot_mode: bool,
    pub verbosity: u8,
}

impl AppContext {
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let root = Self::find_root()?;
        let config = Config::load(cli.config.as_deref(), &root)?;
        let mut ctx = Self::build(root, config)?;
        ctx.robot_mode = cli.robot;
        ctx.verbosity = cli.verbose;
        Ok(ctx)
    }

    /// Wire encoders, the index and the search engine from a loaded config.
    pub fn build(root: PathBuf, config: Config) -> Result<Self> {
        let dims = config.engine.dimension;
        let timeout = config.encoder_timeout();

        let text = build_text_encoder(&config)?;
        let image = build_image_encoder(&config)?;
        let encoders = EncoderSet::new(dims, Arc::clone(&text), image, timeout)?;

        let index_path = config.index_path(&root);
        debug!(path = %index_path.display(), dims, encoder = text.name(), "opening index");
        let index = Arc::new(EmbeddingIndex::open(
            Database::open(&index_path)?,
            text,
            timeout,
        )?);

        let mut fusion = FusionEngine::new(encoders, Arc::new(FileExtractor::new()))
            .with_weights(config.weights.as_modality_weights())
            .with_max_document_chars(config.document.max_chars);
        if config.cache.enabled {
            fusion = fusion.with_cache(Arc::new(QueryCache::new(config.cache.query_entries)));
        }
        let ranker = Ranker::new(Arc::clone(&index))
            .with_max_top_k(config.engine.max_top_k)
            .with_min_score(config.engine.min_score);
        let engine = SearchEngine::new(fusion, ranker)?;

        Ok(Self {
            root,
            config,
            index,
            engine,
            robot_mode: false,
            verbosity: 0,
        })
    }

    fn find_root() -> Result<PathBuf> {
        if let Ok(root) = std::env::var("VIDSEEK_ROOT") {
            return Ok(PathBuf::from(root));
        }
        let cwd = std::env::current_dir()?;
        if let Some(found) = find_upwards(&cwd, ".vidseek") {
            return Ok(found);
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| SeekError::MissingConfig("data directory not found".to_string()))?;
        Ok(data_dir.join("vidseek"))
    }
}

fn build_text_encoder(config: &Config) -> Result<Arc<dyn Encoder>> {
    let dims = config.engine.dimension;
    match config.encoder.backend.as_str() {
        "http" => {
            let endpoint = config.encoder.http_endpoint.as_deref().ok_or_else(|| {
                SeekError::MissingConfig("encoder.http_endpoint".to_string())
            })?;
            let model = config
                .encoder
                .http_model
                .as_deref()
                .ok_or_else(|| SeekError::MissingConfig("encoder.http_model".to_string()))?;
            let api_key = config.encoder.api_key();
            Ok(Arc::new(HttpEmbedder::new(
                endpoint,
                model,
                api_key.as_deref(),
                dims,
                config.encoder_timeout(),
                config.encoder.http_max_retries,
            )?))
        }
        _ => Ok(Arc::new(HashEmbedder::new(dims))),
    }
}

fn build_image_encoder(config: &Config) -> Result<Option<Arc<dyn Encoder>>> {
    if !config.encoder.image_enabled {
        return Ok(None);
    }
    let dims = config.engine.dimension;
    let projection = match &config.encoder.image_projection {
        Some(path) => Projection::from_json_file(path)?,
        None => Projection::seeded(IMAGE_FEATURE_DIMS, dims, DEFAULT_PROJECTION_SEED)?,
    };
    let native: Arc<dyn Encoder> = Arc::new(ImageEncoder::new(config.encoder_timeout()));
    Ok(Some(Arc::new(ProjectedEncoder::new(native, projection)?)))
}

fn find_upwards(start: &Path, name: &str) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(name);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
