//! vidseek remove - Remove videos from the index

use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{emit_json, robot_ok};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Video ids to remove
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Serialize)]
struct RemoveReport {
    removed: Vec<String>,
    missing: Vec<String>,
}

pub fn run(ctx: &AppContext, args: &RemoveArgs) -> Result<()> {
    let mut report = RemoveReport {
        removed: Vec::new(),
        missing: Vec::new(),
    };
    for id in &args.ids {
        if ctx.index.remove(id)? {
            report.removed.push(id.clone());
        } else {
            report.missing.push(id.clone());
        }
    }

    if ctx.robot_mode {
        return emit_json(&robot_ok(&report));
    }
    for id in &report.removed {
        println!("{} removed {id}", "✓".green());
    }
    for id in &report.missing {
        println!("{} not indexed: {id}", "-".dimmed());
    }
    Ok(())
}
