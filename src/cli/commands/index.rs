//! vidseek index - Index video records

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok, robot_partial};
use crate::error::Result;
use crate::record::load_records;
use crate::search::index::{BuildOptions, BuildReport};

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Records file (JSON array or one JSON object per line)
    #[arg(short, long)]
    pub records: PathBuf,

    /// Remove indexed videos that are absent from the records file
    #[arg(long)]
    pub prune: bool,
}

pub fn run(ctx: &AppContext, args: &IndexArgs) -> Result<()> {
    let records = load_records(&args.records)?;
    let options = BuildOptions { prune: args.prune };

    let report = if ctx.robot_mode {
        ctx.index.build(&records, options, |_| {})?
    } else {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("encoding");
        let report = ctx
            .index
            .build(&records, options, |done| pb.set_position(done as u64))?;
        pb.finish_and_clear();
        report
    };

    if ctx.robot_mode {
        output_robot(&report)
    } else {
        output_human(&report);
        Ok(())
    }
}

fn output_robot(report: &BuildReport) -> Result<()> {
    if report.skipped.is_empty() {
        return emit_json(&robot_ok(report));
    }
    let warnings = report
        .skipped
        .iter()
        .map(|s| format!("record {} ({}): {}", s.position, s.video_id, s.code))
        .collect();
    emit_json(&robot_partial(report, report.indexed + report.unchanged, warnings))
}

fn output_human(report: &BuildReport) {
    let mut layout = HumanLayout::new();
    let mark = if report.skipped.is_empty() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    layout
        .push_line(format!("{mark} Indexed {} of {} records", report.indexed, report.total))
        .kv("unchanged", &report.unchanged.to_string())
        .kv("skipped", &report.skipped.len().to_string());
    if report.removed > 0 {
        layout.kv("removed", &report.removed.to_string());
    }
    if !report.skipped.is_empty() {
        layout.blank();
        for skipped in &report.skipped {
            layout.bullet(&format!(
                "#{} {} {} {}",
                skipped.position,
                skipped.video_id,
                skipped.code.yellow(),
                skipped.reason.dimmed()
            ));
        }
    }
    emit_human(layout);
}
