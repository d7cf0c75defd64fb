//! vidseek search - Multimodal search over the index

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::formatters::SearchReport;
use crate::cli::output::emit_json;
use crate::error::{Result, SeekError};
use crate::search::fusion::{ModalityWeights, QueryInput};
use crate::search::ranker::SearchOptions;

#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(short, long)]
    pub query: Option<String>,

    /// Document to search with (pdf, docx, txt, md)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Image to search with (path or URL)
    #[arg(short, long)]
    pub image: Option<String>,

    /// Number of results
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Drop results scoring below this (-1..1)
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Weight of the text query
    #[arg(long)]
    pub weight_text: Option<f32>,

    /// Weight of the image query
    #[arg(long)]
    pub weight_image: Option<f32>,

    /// Weight of the document query
    #[arg(long)]
    pub weight_document: Option<f32>,

    /// Also write the JSON results to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SearchArgs {
    pub fn query_input(&self) -> QueryInput {
        QueryInput {
            text: self.query.clone(),
            file_path: self.file.clone(),
            image_ref: self.image.clone(),
        }
    }

    /// Per-query options layered over the configured defaults
    pub fn options(&self, ctx: &AppContext) -> SearchOptions {
        let overridden =
            self.weight_text.is_some() || self.weight_image.is_some() || self.weight_document.is_some();
        let weights = overridden.then(|| {
            let base = ctx.config.weights.as_modality_weights();
            ModalityWeights {
                text: self.weight_text.unwrap_or(base.text),
                image: self.weight_image.unwrap_or(base.image),
                document: self.weight_document.unwrap_or(base.document),
            }
        });
        SearchOptions {
            top_k: self.top_k.unwrap_or(ctx.config.engine.top_k),
            min_score: self.min_score,
            weights,
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(query) = &self.query {
            parts.push(query.clone());
        }
        if let Some(file) = &self.file {
            parts.push(format!("file:{}", file.display()));
        }
        if let Some(image) = &self.image {
            parts.push(format!("image:{image}"));
        }
        parts.join(" + ")
    }
}

pub fn run(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let started = Instant::now();
    let outcome = ctx
        .engine
        .search_with(&args.query_input(), &args.options(ctx))?;
    let report = SearchReport::new(args.describe(), outcome)
        .with_duration(started.elapsed().as_millis() as u64);

    if let Some(path) = &args.output {
        let payload = serde_json::to_string_pretty(&report.to_json())?;
        std::fs::write(path, payload).map_err(|err| {
            SeekError::Io(std::io::Error::new(
                err.kind(),
                format!("write {}: {err}", path.display()),
            ))
        })?;
    }

    if ctx.robot_mode {
        return emit_json(&report.to_json());
    }
    print!("{}", report.format_human());
    if let Some(path) = &args.output {
        println!("{} results saved to {}", "✓".green(), path.display());
    }
    Ok(())
}
