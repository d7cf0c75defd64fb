use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeekError};
use crate::search::fusion::ModalityWeights;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Defaults, then the global and project files (or only the explicit
    /// file when one is given), then `VIDSEEK_*` environment overrides.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| env_string("VIDSEEK_CONFIG").map(PathBuf::from));

        if let Some(path) = explicit {
            match Self::load_patch(&path)? {
                Some(patch) => config.merge_patch(patch),
                None => {
                    return Err(SeekError::MissingConfig(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match dirs::config_dir() {
            Some(dir) => Self::load_patch(&dir.join("vidseek/config.toml")),
            None => Ok(None),
        }
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| SeekError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| SeekError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.engine {
            self.engine.merge(patch);
        }
        if let Some(patch) = patch.weights {
            self.weights.merge(patch);
        }
        if let Some(patch) = patch.document {
            self.document.merge(patch);
        }
        if let Some(patch) = patch.encoder {
            self.encoder.merge(patch);
        }
        if let Some(patch) = patch.index {
            self.index.merge(patch);
        }
        if let Some(patch) = patch.cache {
            self.cache.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_usize("VIDSEEK_DIMENSION")? {
            self.engine.dimension = value;
        }
        if let Some(value) = env_usize("VIDSEEK_TOP_K")? {
            self.engine.top_k = value;
        }
        if let Some(value) = env_f32("VIDSEEK_MIN_SCORE")? {
            self.engine.min_score = value;
        }
        if let Some(value) = env_u64("VIDSEEK_ENCODER_TIMEOUT_MS")? {
            self.engine.encoder_timeout_ms = value;
        }

        if let Some(value) = env_f32("VIDSEEK_WEIGHT_TEXT")? {
            self.weights.text = value;
        }
        if let Some(value) = env_f32("VIDSEEK_WEIGHT_IMAGE")? {
            self.weights.image = value;
        }
        if let Some(value) = env_f32("VIDSEEK_WEIGHT_DOCUMENT")? {
            self.weights.document = value;
        }

        if let Some(value) = env_usize("VIDSEEK_DOCUMENT_MAX_CHARS")? {
            self.document.max_chars = value;
        }

        if let Some(value) = env_string("VIDSEEK_ENCODER_BACKEND") {
            self.encoder.backend = value;
        }
        if let Some(value) = env_string("VIDSEEK_HTTP_ENDPOINT") {
            self.encoder.http_endpoint = Some(value);
        }
        if let Some(value) = env_string("VIDSEEK_HTTP_MODEL") {
            self.encoder.http_model = Some(value);
        }

        if let Some(value) = env_string("VIDSEEK_INDEX_PATH") {
            self.index.path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_bool("VIDSEEK_CACHE_ENABLED") {
            self.cache.enabled = value;
        }

        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.dimension == 0 {
            return Err(SeekError::Config("engine.dimension must be at least 1".to_string()));
        }
        if engine.max_top_k == 0 {
            return Err(SeekError::Config("engine.max_top_k must be at least 1".to_string()));
        }
        if engine.top_k == 0 || engine.top_k > engine.max_top_k {
            return Err(SeekError::Config(format!(
                "engine.top_k must be between 1 and {} (got {})",
                engine.max_top_k, engine.top_k
            )));
        }
        if !(-1.0..=1.0).contains(&engine.min_score) {
            return Err(SeekError::Config(format!(
                "engine.min_score must be within [-1, 1] (got {})",
                engine.min_score
            )));
        }
        if engine.encoder_timeout_ms == 0 {
            return Err(SeekError::Config(
                "engine.encoder_timeout_ms must be positive".to_string(),
            ));
        }

        let weights = self.weights.as_modality_weights();
        weights.validate()?;
        if weights.text + weights.image + weights.document <= 0.0 {
            return Err(SeekError::Config("at least one modality weight must be positive".to_string()));
        }

        if self.document.max_chars == 0 {
            return Err(SeekError::Config("document.max_chars must be at least 1".to_string()));
        }

        match self.encoder.backend.as_str() {
            "hash" => {}
            "http" => {
                if self.encoder.http_endpoint.is_none() || self.encoder.http_model.is_none() {
                    return Err(SeekError::Config(
                        "encoder.backend = \"http\" needs encoder.http_endpoint and encoder.http_model"
                            .to_string(),
                    ));
                }
            }
            other => {
                return Err(SeekError::Config(format!(
                    "unknown encoder.backend {other:?} (expected \"hash\" or \"http\")"
                )));
            }
        }
        Ok(())
    }

    pub const fn encoder_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.encoder_timeout_ms)
    }

    /// Index database location, defaulting to `<root>/index.db`
    pub fn index_path(&self, root: &Path) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| root.join("index.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub dimension: usize,
    #[serde(default)]
    pub top_k: usize,
    #[serde(default)]
    pub max_top_k: usize,
    #[serde(default)]
    pub min_score: f32,
    #[serde(default)]
    pub encoder_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            top_k: 5,
            max_top_k: 1000,
            min_score: -1.0,
            encoder_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    fn merge(&mut self, patch: EnginePatch) {
        if let Some(value) = patch.dimension {
            self.dimension = value;
        }
        if let Some(value) = patch.top_k {
            self.top_k = value;
        }
        if let Some(value) = patch.max_top_k {
            self.max_top_k = value;
        }
        if let Some(value) = patch.min_score {
            self.min_score = value;
        }
        if let Some(value) = patch.encoder_timeout_ms {
            self.encoder_timeout_ms = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default)]
    pub text: f32,
    #[serde(default)]
    pub image: f32,
    #[serde(default)]
    pub document: f32,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            text: 1.0,
            image: 1.0,
            document: 1.0,
        }
    }
}

impl WeightsConfig {
    fn merge(&mut self, patch: WeightsPatch) {
        if let Some(value) = patch.text {
            self.text = value;
        }
        if let Some(value) = patch.image {
            self.image = value;
        }
        if let Some(value) = patch.document {
            self.document = value;
        }
    }

    pub const fn as_modality_weights(&self) -> ModalityWeights {
        ModalityWeights {
            text: self.text,
            image: self.image,
            document: self.document,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default)]
    pub max_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { max_chars: 5000 }
    }
}

impl DocumentConfig {
    fn merge(&mut self, patch: DocumentPatch) {
        if let Some(value) = patch.max_chars {
            self.max_chars = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub http_endpoint: Option<String>,
    #[serde(default)]
    pub http_model: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: String,
    #[serde(default)]
    pub http_max_retries: usize,
    #[serde(default)]
    pub image_enabled: bool,
    #[serde(default)]
    pub image_projection: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            backend: "hash".to_string(),
            http_endpoint: None,
            http_model: None,
            api_key_env: "VIDSEEK_API_KEY".to_string(),
            http_max_retries: 3,
            image_enabled: true,
            image_projection: None,
        }
    }
}

impl EncoderConfig {
    fn merge(&mut self, patch: EncoderPatch) {
        if let Some(value) = patch.backend {
            self.backend = value;
        }
        if let Some(value) = patch.http_endpoint {
            self.http_endpoint = Some(value);
        }
        if let Some(value) = patch.http_model {
            self.http_model = Some(value);
        }
        if let Some(value) = patch.api_key_env {
            self.api_key_env = value;
        }
        if let Some(value) = patch.http_max_retries {
            self.http_max_retries = value;
        }
        if let Some(value) = patch.image_enabled {
            self.image_enabled = value;
        }
        if let Some(value) = patch.image_projection {
            self.image_projection = Some(value);
        }
    }

    /// API key read from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        env_string(&self.api_key_env).filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl IndexConfig {
    fn merge(&mut self, patch: IndexPatch) {
        if let Some(value) = patch.path {
            self.path = Some(value);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub query_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_entries: 128,
        }
    }
}

impl CacheConfig {
    fn merge(&mut self, patch: CachePatch) {
        if let Some(value) = patch.enabled {
            self.enabled = value;
        }
        if let Some(value) = patch.query_entries {
            self.query_entries = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub engine: Option<EnginePatch>,
    pub weights: Option<WeightsPatch>,
    pub document: Option<DocumentPatch>,
    pub encoder: Option<EncoderPatch>,
    pub index: Option<IndexPatch>,
    pub cache: Option<CachePatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EnginePatch {
    pub dimension: Option<usize>,
    pub top_k: Option<usize>,
    pub max_top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub encoder_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WeightsPatch {
    pub text: Option<f32>,
    pub image: Option<f32>,
    pub document: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DocumentPatch {
    pub max_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EncoderPatch {
    pub backend: Option<String>,
    pub http_endpoint: Option<String>,
    pub http_model: Option<String>,
    pub api_key_env: Option<String>,
    pub http_max_retries: Option<usize>,
    pub image_enabled: Option<bool>,
    pub image_projection: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IndexPatch {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CachePatch {
    pub enabled: Option<bool>,
    pub query_entries: Option<usize>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_usize(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<usize>().map(Some).map_err(|err| {
            SeekError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            SeekError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f32(key: &str) -> Result<Option<f32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<f32>().map(Some).map_err(|err| {
            SeekError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
