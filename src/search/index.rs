//! Embedding index
//!
//! One [`IndexEntry`] per video, kept in memory as `Arc`s behind a
//! `parking_lot::RwLock` and persisted to SQLite. Writers encode outside
//! any lock, commit the row, then swap the `Arc` under a short write lock,
//! so a concurrent search sees either the old entry or the new one.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EncodingError, EncodingFailure, Result, SeekError};
use crate::record::VideoRecord;
use crate::search::content_hash;
use crate::search::embeddings::{Encoder, dot, encode_text_blob, normalize};
use crate::storage::Database;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub video_id: String,
    /// Unit-length vector of the index dimension
    pub embedding: Vec<f32>,
    /// Hex SHA-256 of the text blob the embedding came from
    pub source_text_hash: String,
    pub title: Option<String>,
    pub channel_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Display metadata stored next to an embedding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    pub title: Option<String>,
    pub channel_name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&VideoRecord> for EntryMeta {
    fn from(record: &VideoRecord) -> Self {
        Self {
            title: Some(record.title.clone()).filter(|t| !t.trim().is_empty()),
            channel_name: record.channel_name.clone(),
            published_at: Some(record.published_at),
        }
    }
}

impl IndexEntry {
    fn meta(&self) -> EntryMeta {
        EntryMeta {
            title: self.title.clone(),
            channel_name: self.channel_name.clone(),
            published_at: self.published_at,
        }
    }

    fn with_meta(video_id: &str, embedding: Vec<f32>, hash: String, meta: EntryMeta) -> Self {
        Self {
            video_id: video_id.to_string(),
            embedding,
            source_text_hash: hash,
            title: meta.title,
            channel_name: meta.channel_name,
            published_at: meta.published_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same text hash and metadata; nothing was encoded or written
    Unchanged,
}

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub video_id: String,
    pub score: f32,
    /// 1-based position in the result list
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Remove entries whose ids are absent from the record batch
    pub prune: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// 1-based position in the input batch
    pub position: usize,
    pub video_id: String,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub total: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub skipped: Vec<SkippedRecord>,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: usize,
    pub encoder: String,
    pub persistent: bool,
}

enum Prepared {
    Unchanged,
    Ready(IndexEntry),
    Skipped { code: String, reason: String },
}

pub struct EmbeddingIndex {
    entries: RwLock<BTreeMap<String, Arc<IndexEntry>>>,
    /// Durable store; the mutex also serializes writers
    store: Mutex<Option<Database>>,
    encoder: Arc<dyn Encoder>,
    dims: usize,
    timeout: Duration,
}

impl EmbeddingIndex {
    /// Index with no durable store
    pub fn in_memory(encoder: Arc<dyn Encoder>, timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            store: Mutex::new(None),
            dims: encoder.dims(),
            encoder,
            timeout,
        }
    }

    /// Load every stored entry and keep the database as the write-through store.
    ///
    /// Fails with `InvalidDimension` if the database was built for another
    /// dimension or holds a vector of the wrong length.
    pub fn open(db: Database, encoder: Arc<dyn Encoder>, timeout: Duration) -> Result<Self> {
        let dims = encoder.dims();
        db.sync_meta(dims, encoder.name())?;

        let mut entries = BTreeMap::new();
        for entry in db.load_entries()? {
            if entry.embedding.len() != dims {
                return Err(SeekError::InvalidDimension {
                    expected: dims,
                    actual: entry.embedding.len(),
                });
            }
            entries.insert(entry.video_id.clone(), Arc::new(entry));
        }
        debug!(entries = entries.len(), dims, "loaded embedding index");

        Ok(Self {
            entries: RwLock::new(entries),
            store: Mutex::new(Some(db)),
            dims,
            encoder,
            timeout,
        })
    }

    pub const fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, video_id: &str) -> Option<Arc<IndexEntry>> {
        self.entries.read().get(video_id).cloned()
    }

    /// Point-in-time copy of every entry, ordered by video id
    pub fn snapshot(&self) -> Vec<Arc<IndexEntry>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.len(),
            dimension: self.dims,
            encoder: self.encoder.name().to_string(),
            persistent: self.store.lock().is_some(),
        }
    }

    /// Staleness key of a text blob under this index's encoder.
    ///
    /// The encoder name is part of the key, so switching encoders makes
    /// every stored entry stale and the next upsert re-encodes it.
    pub fn source_hash(&self, text_blob: &str) -> String {
        content_hash(&format!("{}\0{text_blob}", self.encoder.name()))
    }

    /// Insert or refresh one entry from its text blob.
    pub fn upsert(&self, video_id: &str, text_blob: &str) -> Result<UpsertOutcome> {
        let meta = self.get(video_id).map(|e| e.meta()).unwrap_or_default();
        self.upsert_with_meta(video_id, text_blob, meta)
    }

    /// Like [`Self::upsert`], also storing display metadata.
    ///
    /// An unchanged hash never triggers an encoder call.
    pub fn upsert_with_meta(
        &self,
        video_id: &str,
        text_blob: &str,
        meta: EntryMeta,
    ) -> Result<UpsertOutcome> {
        if video_id.trim().is_empty() {
            return Err(SeekError::InvalidQuery("video id must not be empty".to_string()));
        }
        let existing = self.get(video_id);
        match self.prepare(video_id, text_blob, meta, existing.as_deref())? {
            Some(entry) => self.commit(entry, existing.is_some()),
            None => Ok(UpsertOutcome::Unchanged),
        }
    }

    /// Returns Ok(None) when the stored entry already matches.
    fn prepare(
        &self,
        video_id: &str,
        text_blob: &str,
        meta: EntryMeta,
        existing: Option<&IndexEntry>,
    ) -> std::result::Result<Option<IndexEntry>, EncodingError> {
        let hash = self.source_hash(text_blob);
        if let Some(current) = existing.filter(|e| e.source_text_hash == hash) {
            if current.meta() == meta {
                return Ok(None);
            }
            // text unchanged, metadata refreshed: keep the vector
            return Ok(Some(IndexEntry::with_meta(
                video_id,
                current.embedding.clone(),
                hash,
                meta,
            )));
        }

        if text_blob.trim().is_empty() {
            return Err(EncodingError::empty_input(self.encoder.modality()));
        }
        let embedding = encode_text_blob(&self.encoder, text_blob, self.timeout)?;
        if embedding.len() != self.dims {
            return Err(EncodingError::new(
                self.encoder.modality(),
                EncodingFailure::Backend,
                format!("encoder returned {} dims, index is {}", embedding.len(), self.dims),
            ));
        }
        Ok(Some(IndexEntry::with_meta(video_id, embedding, hash, meta)))
    }

    fn commit(&self, entry: IndexEntry, existed: bool) -> Result<UpsertOutcome> {
        let mut store = self.store.lock();
        if let Some(db) = store.as_mut() {
            db.put_entry(&entry)?;
        }
        let previous = self
            .entries
            .write()
            .insert(entry.video_id.clone(), Arc::new(entry));
        drop(store);

        Ok(if previous.is_some() || existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Delete an entry. Returns whether it existed; absent ids are a no-op.
    pub fn remove(&self, video_id: &str) -> Result<bool> {
        let mut store = self.store.lock();
        if let Some(db) = store.as_mut() {
            db.delete_entry(video_id)?;
        }
        let removed = self.entries.write().remove(video_id).is_some();
        drop(store);
        Ok(removed)
    }

    /// Top-k entries by cosine similarity to `query`.
    ///
    /// Results are ordered by score descending, then video id ascending,
    /// and ranked 1..n. Scores are clamped to [-1, 1].
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(SeekError::InvalidTopK {
                requested: top_k,
                max: usize::MAX,
            });
        }
        if query.len() != self.dims {
            return Err(SeekError::InvalidDimension {
                expected: self.dims,
                actual: query.len(),
            });
        }
        let query = normalize(query).ok_or_else(|| {
            SeekError::InvalidQuery("query vector has zero length".to_string())
        })?;

        let snapshot = self.snapshot();
        let mut scored: Vec<(f32, Arc<IndexEntry>)> = snapshot
            .into_iter()
            .map(|entry| (dot(&query, &entry.embedding).clamp(-1.0, 1.0), entry))
            .collect();

        let k = top_k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k, compare_hits);
            scored.truncate(k);
        }
        scored.sort_by(compare_hits);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(idx, (score, entry))| SearchResult {
                video_id: entry.video_id.clone(),
                score,
                rank: idx + 1,
                title: entry.title.clone(),
                channel_name: entry.channel_name.clone(),
                published_at: entry.published_at,
            })
            .collect())
    }

    /// Index a batch of records.
    ///
    /// Records are encoded in parallel and committed in input order. A
    /// record that fails to encode is skipped and reported; the batch
    /// carries on. When an id repeats, the last record wins and earlier
    /// ones are skipped as `DUPLICATE_ID`. `on_progress` is called once
    /// per record.
    pub fn build(
        &self,
        records: &[VideoRecord],
        options: BuildOptions,
        mut on_progress: impl FnMut(usize),
    ) -> Result<BuildReport> {
        let last_position: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id.as_str(), idx))
            .collect();
        let prepared: Vec<Prepared> = records
            .par_iter()
            .enumerate()
            .map(|(idx, record)| match last_position.get(record.id.as_str()) {
                Some(&last) if last != idx && !record.id.trim().is_empty() => Prepared::Skipped {
                    code: "DUPLICATE_ID".to_string(),
                    reason: format!("video id also appears at record {}", last + 1),
                },
                _ => self.prepare_record(record),
            })
            .collect();

        let mut report = BuildReport {
            total: records.len(),
            ..BuildReport::default()
        };
        for (idx, (record, outcome)) in records.iter().zip(prepared).enumerate() {
            match outcome {
                Prepared::Unchanged => report.unchanged += 1,
                Prepared::Ready(entry) => {
                    let existed = self.get(&entry.video_id).is_some();
                    self.commit(entry, existed)?;
                    report.indexed += 1;
                }
                Prepared::Skipped { code, reason } => {
                    warn!(position = idx + 1, video_id = %record.id, %code, "skipping record");
                    report.skipped.push(SkippedRecord {
                        position: idx + 1,
                        video_id: record.id.clone(),
                        code,
                        reason,
                    });
                }
            }
            on_progress(idx + 1);
        }

        if options.prune {
            let keep: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
            let stale: Vec<String> = self
                .entries
                .read()
                .keys()
                .filter(|id| !keep.contains(id.as_str()))
                .cloned()
                .collect();
            for id in stale {
                if self.remove(&id)? {
                    report.removed += 1;
                }
            }
        }

        info!(
            total = report.total,
            indexed = report.indexed,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            removed = report.removed,
            "index build finished"
        );
        Ok(report)
    }

    fn prepare_record(&self, record: &VideoRecord) -> Prepared {
        if record.id.trim().is_empty() {
            return Prepared::Skipped {
                code: "EMPTY_ID".to_string(),
                reason: "record has no video id".to_string(),
            };
        }
        let existing = self.get(&record.id);
        match self.prepare(
            &record.id,
            &record.index_text(),
            EntryMeta::from(record),
            existing.as_deref(),
        ) {
            Ok(Some(entry)) => Prepared::Ready(entry),
            Ok(None) => Prepared::Unchanged,
            Err(err) => Prepared::Skipped {
                code: err.kind.as_str().to_string(),
                reason: err.to_string(),
            },
        }
    }
}

fn compare_hits(a: &(f32, Arc<IndexEntry>), b: &(f32, Arc<IndexEntry>)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| a.1.video_id.cmp(&b.1.video_id))
}
