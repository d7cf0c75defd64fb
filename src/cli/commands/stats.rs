//! vidseek stats - Index statistics

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, robot_ok};
use crate::error::Result;

#[derive(Args, Debug, Default)]
pub struct StatsArgs {}

pub fn run(ctx: &AppContext, _args: &StatsArgs) -> Result<()> {
    let stats = ctx.index.stats();
    if ctx.robot_mode {
        return emit_json(&robot_ok(&stats));
    }

    let index_path = ctx.config.index_path(&ctx.root);
    let mut layout = HumanLayout::new();
    layout
        .title("vidseek index")
        .kv("entries", &stats.entries.to_string())
        .kv("dimension", &stats.dimension.to_string())
        .kv("encoder", &stats.encoder)
        .kv("path", &index_path.display().to_string());
    emit_human(layout);
    Ok(())
}
