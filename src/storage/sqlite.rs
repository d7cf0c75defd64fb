//! SQLite database layer

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::error::{Result, SeekError};
use crate::search::index::IndexEntry;

/// Bumped whenever the table layout changes
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS index_entries (
    video_id TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    dims INTEGER NOT NULL,
    source_text_hash TEXT NOT NULL,
    title TEXT,
    channel_name TEXT,
    published_at TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// SQLite store for the embedding index
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Private in-memory database, used by tests and throwaway indexes
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    fn meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM index_meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Record the index dimension and encoder, or check them against a
    /// previously stored index.
    ///
    /// A different dimension is fatal. A different encoder name warns and is
    /// recorded; entry hashes are keyed by encoder name, so the next build
    /// re-encodes every stored entry.
    pub fn sync_meta(&self, dims: usize, encoder_name: &str) -> Result<()> {
        match self.meta("dimension")? {
            Some(stored) => {
                let stored: usize = stored.parse().map_err(|_| {
                    SeekError::Serialization(format!("corrupt stored dimension {stored:?}"))
                })?;
                if stored != dims {
                    return Err(SeekError::InvalidDimension {
                        expected: dims,
                        actual: stored,
                    });
                }
            }
            None => self.set_meta("dimension", &dims.to_string())?,
        }

        match self.meta("encoder")? {
            Some(stored) if stored != encoder_name => {
                warn!(
                    stored = %stored,
                    configured = %encoder_name,
                    "index was built with a different encoder; entries are re-encoded on the next build"
                );
                self.set_meta("encoder", encoder_name)?;
            }
            Some(_) => {}
            None => self.set_meta("encoder", encoder_name)?,
        }
        Ok(())
    }

    pub fn stored_encoder(&self) -> Result<Option<String>> {
        self.meta("encoder")
    }

    /// Insert or replace one entry in a single transaction
    pub fn put_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO index_entries
                (video_id, embedding, dims, source_text_hash, title, channel_name, published_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(video_id) DO UPDATE SET
                embedding = excluded.embedding,
                dims = excluded.dims,
                source_text_hash = excluded.source_text_hash,
                title = excluded.title,
                channel_name = excluded.channel_name,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at",
            params![
                entry.video_id,
                encode_vector(&entry.embedding),
                entry.embedding.len() as i64,
                entry.source_text_hash,
                entry.title,
                entry.channel_name,
                entry.published_at.map(|ts| ts.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns whether a row was deleted
    pub fn delete_entry(&mut self, video_id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM index_entries WHERE video_id = ?", [video_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn load_entries(&self) -> Result<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT video_id, embedding, dims, source_text_hash, title, channel_name, published_at
             FROM index_entries ORDER BY video_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawEntry {
                video_id: row.get(0)?,
                embedding: row.get(1)?,
                dims: row.get(2)?,
                source_text_hash: row.get(3)?,
                title: row.get(4)?,
                channel_name: row.get(5)?,
                published_at: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    pub fn count_entries(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM index_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

struct RawEntry {
    video_id: String,
    embedding: Vec<u8>,
    dims: i64,
    source_text_hash: String,
    title: Option<String>,
    channel_name: Option<String>,
    published_at: Option<String>,
}

impl RawEntry {
    fn into_entry(self) -> Result<IndexEntry> {
        let embedding = decode_vector(&self.embedding).ok_or_else(|| {
            SeekError::Serialization(format!("corrupt embedding blob for {}", self.video_id))
        })?;
        if i64::try_from(embedding.len()).ok() != Some(self.dims) {
            return Err(SeekError::Serialization(format!(
                "embedding for {} has {} values, row says {}",
                self.video_id,
                embedding.len(),
                self.dims
            )));
        }
        let published_at = self
            .published_at
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|err| {
                        SeekError::Serialization(format!(
                            "bad published_at for {}: {err}",
                            self.video_id
                        ))
                    })
            })
            .transpose()?;

        Ok(IndexEntry {
            video_id: self.video_id,
            embedding,
            source_text_hash: self.source_text_hash,
            title: self.title,
            channel_name: self.channel_name,
            published_at,
        })
    }
}

/// Little-endian f32 bytes
fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn entry(id: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            video_id: id.to_string(),
            embedding,
            source_text_hash: format!("hash-{id}"),
            title: Some(format!("Title {id}")),
            channel_name: None,
            published_at: Some(Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("index.db")).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_put_load_roundtrip_preserves_bits() {
        let mut db = Database::open_in_memory().unwrap();
        let original = entry("a", vec![0.6, -0.8, f32::MIN_POSITIVE]);
        db.put_entry(&original).unwrap();

        let loaded = db.load_entries().unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn test_put_replaces_existing_row() {
        let mut db = Database::open_in_memory().unwrap();
        db.put_entry(&entry("a", vec![1.0, 0.0])).unwrap();
        db.put_entry(&entry("a", vec![0.0, 1.0])).unwrap();

        let loaded = db.load_entries().unwrap();
        assert_eq!(db.count_entries().unwrap(), 1);
        assert_eq!(loaded[0].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_delete_reports_presence() {
        let mut db = Database::open_in_memory().unwrap();
        db.put_entry(&entry("a", vec![1.0])).unwrap();
        assert!(db.delete_entry("a").unwrap());
        assert!(!db.delete_entry("a").unwrap());
    }

    #[test]
    fn test_dimension_mismatch_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");
        Database::open(&path).unwrap().sync_meta(384, "hash").unwrap();

        let err = Database::open(&path).unwrap().sync_meta(512, "hash").unwrap_err();
        assert!(matches!(
            err,
            SeekError::InvalidDimension {
                expected: 512,
                actual: 384
            }
        ));
    }

    #[test]
    fn test_encoder_change_is_recorded() {
        let db = Database::open_in_memory().unwrap();
        db.sync_meta(8, "hash-fnv1a").unwrap();
        db.sync_meta(8, "http:model").unwrap();
        assert_eq!(db.stored_encoder().unwrap().as_deref(), Some("http:model"));
    }

    #[test]
    fn test_decode_rejects_ragged_blob() {
        assert!(decode_vector(&[0, 0, 0]).is_none());
        assert_eq!(decode_vector(&encode_vector(&[1.5])), Some(vec![1.5]));
    }
}
