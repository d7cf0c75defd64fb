//! Search results formatter
//!
//! Renders a search outcome either as a ranked terminal listing or as the
//! JSON response used in robot mode.

use std::fmt::Write as _;

use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use crate::error::DroppedModality;
use crate::search::embeddings::Modality;
use crate::search::index::SearchResult;
use crate::search::ranker::SearchOutcome;

/// A finished search plus what the user asked for
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Short description of the query inputs
    pub query: String,
    pub outcome: SearchOutcome,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
struct SearchResponseJson<'a> {
    status: &'static str,
    query: &'a str,
    count: usize,
    modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dropped: Vec<DroppedModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    results: &'a [SearchResult],
}

impl SearchReport {
    pub fn new(query: impl Into<String>, outcome: SearchOutcome) -> Self {
        Self {
            query: query.into(),
            outcome,
            duration_ms: None,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        let response = SearchResponseJson {
            status: if self.outcome.dropped.is_empty() {
                "ok"
            } else {
                "partial"
            },
            query: &self.query,
            count: self.outcome.results.len(),
            modalities: self.outcome.used.iter().map(|m| m.modality).collect(),
            dropped: self.outcome.dropped.clone(),
            duration_ms: self.duration_ms,
            results: &self.outcome.results,
        };
        serde_json::to_value(response).unwrap_or(serde_json::Value::Null)
    }

    pub fn format_human(&self) -> String {
        debug!(target: "search", results = self.outcome.results.len(), "rendering results");
        let mut out = String::new();

        for dropped in &self.outcome.dropped {
            let _ = writeln!(
                out,
                "{} {} input ignored: {} ({})",
                "!".yellow().bold(),
                dropped.modality,
                dropped.reason,
                dropped.code
            );
        }

        if self.outcome.results.is_empty() {
            let _ = writeln!(out, "! No videos found for '{}'\n", self.query);
            out.push_str("Try:\n  - Using different keywords\n  - Lowering --min-score\n");
            return out;
        }

        out.push_str(&self.metadata_header());
        out.push_str("\n\n");
        for result in &self.outcome.results {
            out.push_str(&format_result(result));
            out.push('\n');
        }
        out
    }

    fn metadata_header(&self) -> String {
        let modalities = self
            .outcome
            .used
            .iter()
            .map(|m| m.modality.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let mut header = format!(
            "{} results for '{}' [{}]",
            self.outcome.results.len(),
            self.query.bold(),
            modalities
        );
        if let Some(ms) = self.duration_ms {
            let _ = write!(header, " in {ms}ms");
        }
        header
    }
}

fn format_result(result: &SearchResult) -> String {
    let title = result.title.as_deref().unwrap_or(&result.video_id);
    let mut line = format!(
        "{:>3}. {} {}",
        result.rank,
        title.bold(),
        format!("({:.1}% match)", result.score * 100.0).green()
    );
    let mut details = vec![result.video_id.clone()];
    if let Some(channel) = &result.channel_name {
        details.push(channel.clone());
    }
    if let Some(published) = result.published_at {
        details.push(published.format("%Y-%m-%d").to_string());
    }
    let _ = write!(line, "\n     {}", details.join(" | ").dimmed());
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fusion::ModalityVector;

    fn outcome(results: Vec<SearchResult>) -> SearchOutcome {
        SearchOutcome {
            results,
            used: vec![ModalityVector {
                modality: Modality::Text,
                vector: vec![1.0],
                weight: 1.0,
            }],
            dropped: Vec::new(),
        }
    }

    fn hit(id: &str, rank: usize, score: f32) -> SearchResult {
        SearchResult {
            video_id: id.to_string(),
            score,
            rank,
            title: Some(format!("title {id}")),
            channel_name: None,
            published_at: None,
        }
    }

    #[test]
    fn test_json_lists_results_in_rank_order() {
        let report = SearchReport::new("rust", outcome(vec![hit("a", 1, 0.9), hit("b", 2, 0.4)]));
        let json = report.to_json();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["count"], 2);
        assert_eq!(json["modalities"][0], "text");
        assert_eq!(json["results"][1]["video_id"], "b");
        assert!(json.get("dropped").is_none());
    }

    #[test]
    fn test_json_reports_dropped_modality() {
        let mut out = outcome(vec![hit("a", 1, 0.9)]);
        out.dropped.push(DroppedModality {
            modality: Modality::Document,
            code: "UNREADABLE_FILE".to_string(),
            reason: "bad pdf".to_string(),
        });
        let json = SearchReport::new("rust", out).to_json();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["dropped"][0]["code"], "UNREADABLE_FILE");
    }

    #[test]
    fn test_human_output_shows_match_percent() {
        colored::control::set_override(false);
        let text = SearchReport::new("rust", outcome(vec![hit("a", 1, 0.875)])).format_human();
        assert!(text.contains("1. title a (87.5% match)"), "{text}");
    }

    #[test]
    fn test_human_output_for_no_results() {
        colored::control::set_override(false);
        let text = SearchReport::new("rust", outcome(Vec::new())).format_human();
        assert!(text.contains("No videos found for 'rust'"));
    }
}
