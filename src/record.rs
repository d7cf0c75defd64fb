//! Video records supplied by the record store
//!
//! Records are read-only input. This module turns one into the text blob
//! the text encoder sees, and loads record batches from JSON/JSONL dumps.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SeekError};
use crate::search::embeddings::LONG_TEXT_CHARS;

/// Transcripts shorter than this are ignored
const MIN_TRANSCRIPT_CHARS: usize = 100;
/// Transcripts longer than this are sampled head/middle/tail
const MAX_TRANSCRIPT_CHARS: usize = 8000;
const MAX_DESCRIPTION_CHARS: usize = 2000;
const MAX_TAGS: usize = 15;
/// Budget of the composed, cleaned blob
pub const MAX_BLOB_CHARS: usize = 5000;

const TRANSCRIPT_REPEAT: usize = 5;
const TITLE_REPEAT: usize = 3;
const DESCRIPTION_REPEAT: usize = 2;
const TAGS_REPEAT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Weighted, cleaned text used as the record's embedding input.
    ///
    /// Fields are repeated to weight them: transcript x5, title x3,
    /// description x2, tags x2, channel x1.
    pub fn compose_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();

        let transcript_sample = self
            .transcript
            .as_deref()
            .filter(|t| t.chars().count() >= MIN_TRANSCRIPT_CHARS)
            .map(sample_transcript);
        if let Some(sample) = transcript_sample.as_deref() {
            parts.extend(std::iter::repeat_n(sample, TRANSCRIPT_REPEAT));
        }

        if !self.title.trim().is_empty() {
            parts.extend(std::iter::repeat_n(self.title.as_str(), TITLE_REPEAT));
        }

        let description = head_chars(&self.description, MAX_DESCRIPTION_CHARS);
        if !description.trim().is_empty() {
            parts.extend(std::iter::repeat_n(description, DESCRIPTION_REPEAT));
        }

        let tags = self
            .tags
            .iter()
            .take(MAX_TAGS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if !tags.trim().is_empty() {
            parts.extend(std::iter::repeat_n(tags.as_str(), TAGS_REPEAT));
        }

        if let Some(channel) = self.channel_name.as_deref().filter(|c| !c.trim().is_empty()) {
            parts.push(channel);
        }

        clean_text(&parts.join(" "), MAX_BLOB_CHARS)
    }

    /// Blob handed to the index for this record.
    ///
    /// Records with very long transcripts get the full cleaned transcript
    /// appended, which pushes the blob over the pooling threshold so the
    /// whole transcript is covered by chunked encoding.
    pub fn index_text(&self) -> String {
        let composed = self.compose_text();
        match self.transcript.as_deref() {
            Some(transcript) if transcript.chars().count() > LONG_TEXT_CHARS => {
                let full = clean_text(transcript, usize::MAX);
                if composed.is_empty() {
                    full
                } else {
                    format!("{composed}. {full}")
                }
            }
            _ => composed,
        }
    }
}

fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Head, middle and tail thirds of an over-long transcript
fn sample_transcript(transcript: &str) -> String {
    let chars: Vec<char> = transcript.chars().collect();
    if chars.len() <= MAX_TRANSCRIPT_CHARS {
        return transcript.to_string();
    }
    let chunk = MAX_TRANSCRIPT_CHARS / 3;
    let head: String = chars[..chunk].iter().collect();
    let middle_start = chars.len() / 2 - chunk / 2;
    let middle: String = chars[middle_start..middle_start + chunk].iter().collect();
    let tail: String = chars[chars.len() - chunk..].iter().collect();
    format!("{head} {middle} {tail}")
}

static NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-.,!?]").expect("static regex compiles"));

/// NFKC-normalize, replace symbols with spaces, collapse whitespace, cap length.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let normalized: String = text.nfkc().collect();
    let replaced = NOISE.replace_all(&normalized, " ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    head_chars(&collapsed, max_chars).trim_end().to_string()
}

/// Load records from a JSON array file or a JSON-lines file.
pub fn load_records(path: &Path) -> Result<Vec<VideoRecord>> {
    let raw = std::fs::read_to_string(path)?;
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(&raw).map_err(|err| {
            SeekError::Serialization(format!("parse records {}: {err}", path.display()))
        });
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|err| {
                SeekError::Serialization(format!("{}:{}: {err}", path.display(), idx + 1))
            })
        })
        .collect()
}
