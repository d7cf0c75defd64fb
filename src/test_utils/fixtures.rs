use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::record::VideoRecord;

/// Isolated filesystem environment for a test.
pub struct UnitTestFixture {
    pub temp_dir: TempDir,
    pub data_path: PathBuf,
}

impl Default for UnitTestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitTestFixture {
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_path = temp_dir.path().to_path_buf();
        println!("[FIXTURE] Created temp directory: {data_path:?}");
        Self {
            temp_dir,
            data_path,
        }
    }

    /// Create a file with content, creating parent directories.
    #[must_use]
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.data_path.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    /// Write records as JSON lines.
    #[must_use]
    pub fn create_records(&self, relative_path: &str, records: &[VideoRecord]) -> PathBuf {
        let body = records
            .iter()
            .map(|r| serde_json::to_string(r).expect("Failed to serialize record"))
            .collect::<Vec<_>>()
            .join("\n");
        self.create_file(relative_path, &body)
    }

    /// Path of the index database inside the fixture
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("index.db")
    }
}

/// A record with title, description and tags derived from `topic`.
#[must_use]
pub fn sample_record(id: &str, topic: &str) -> VideoRecord {
    VideoRecord {
        id: id.to_string(),
        title: format!("{topic} explained"),
        description: format!("A walkthrough of {topic} for beginners"),
        tags: topic.split_whitespace().map(str::to_string).collect(),
        transcript: None,
        channel_name: Some("Test Channel".to_string()),
        published_at: Utc
            .with_ymd_and_hms(2024, 1, 15, 9, 30, 0)
            .single()
            .expect("valid timestamp"),
    }
}

/// A record with nothing embeddable.
#[must_use]
pub fn blank_record(id: &str) -> VideoRecord {
    VideoRecord {
        title: "   ".to_string(),
        description: String::new(),
        tags: Vec::new(),
        channel_name: None,
        ..sample_record(id, "blank")
    }
}

/// Ten records on distinct topics.
#[must_use]
pub fn topic_records() -> Vec<VideoRecord> {
    [
        "rust ownership",
        "python decorators",
        "sourdough baking",
        "neural networks",
        "guitar chords",
        "marathon training",
        "linear algebra",
        "watercolor painting",
        "kubernetes networking",
        "italian cooking",
    ]
    .iter()
    .enumerate()
    .map(|(idx, topic)| sample_record(&format!("vid-{:02}", idx + 1), topic))
    .collect()
}
