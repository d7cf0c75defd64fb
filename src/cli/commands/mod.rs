//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use clap::Subcommand;

pub mod index;
pub mod remove;
pub mod search;
pub mod stats;

use crate::app::AppContext;
use crate::error::Result;

pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Index(args) => index::run(ctx, args),
        Commands::Search(args) => search::run(ctx, args),
        Commands::Remove(args) => remove::run(ctx, args),
        Commands::Stats(args) => stats::run(ctx, args),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index video records from a JSON or JSONL file
    Index(index::IndexArgs),

    /// Search the index with text, a document and/or an image
    Search(search::SearchArgs),

    /// Remove videos from the index
    Remove(remove::RemoveArgs),

    /// Show index statistics
    Stats(stats::StatsArgs),
}
