//! Document text extraction
//!
//! The engine only depends on [`DocumentExtractor`]; [`FileExtractor`] is
//! the stock implementation for PDF, DOCX and plain text files.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ExtractionError, ExtractionFailure};

/// Default character budget for extracted document text
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 5000;

pub trait DocumentExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "md" | "markdown" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Extracts text from files on disk by extension
#[derive(Debug, Clone, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub const fn new() -> Self {
        Self
    }
}

impl DocumentExtractor for FileExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let format = DocumentFormat::detect(path).ok_or_else(|| {
            ExtractionError::new(
                path,
                ExtractionFailure::UnsupportedFormat,
                "expected .pdf, .docx, .txt or .md",
            )
        })?;
        let bytes = std::fs::read(path).map_err(|err| {
            ExtractionError::new(path, ExtractionFailure::UnreadableFile, err.to_string())
        })?;

        let raw = match format {
            DocumentFormat::Pdf => pdf_text(&bytes).map_err(|detail| {
                ExtractionError::new(path, ExtractionFailure::UnreadableFile, detail)
            })?,
            DocumentFormat::Docx => docx_text(&bytes).map_err(|detail| {
                ExtractionError::new(path, ExtractionFailure::UnreadableFile, detail)
            })?,
            DocumentFormat::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
        };

        let text = collapse_whitespace(&raw);
        if text.is_empty() {
            return Err(ExtractionError::new(
                path,
                ExtractionFailure::EmptyContent,
                "document contains no text",
            ));
        }
        Ok(text)
    }
}

static XML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex compiles"));

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    contain_parser_panic("PDF", || {
        pdf_extract::extract_text_from_mem(bytes).map_err(|err| err.to_string())
    })
}

/// Turn a parser panic into an error. Relies on `panic = "unwind"`, which
/// the release profile sets.
fn contain_parser_panic<T>(
    format: &str,
    parse: impl FnOnce() -> Result<T, String>,
) -> Result<T, String> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(parse))
        .unwrap_or_else(|_| Err(format!("{format} parser panicked")))
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| err.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| err.to_string())?
        .read_to_string(&mut xml)
        .map_err(|err| err.to_string())?;

    let with_breaks = xml.replace("</w:p>", "\n").replace("<w:tab/>", " ");
    let stripped = XML_TAG.replace_all(&with_breaks, "");
    Ok(stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the first `max_chars` characters.
///
/// The cut point depends only on the budget, never on content.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
