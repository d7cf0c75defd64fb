//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

pub mod commands;
pub mod formatters;
pub mod output;

pub use commands::Commands;

/// vidseek - multimodal video search
#[derive(Parser, Debug)]
#[command(name = "vidseek", version, about, long_about = None)]
pub struct Cli {
    /// Config file (replaces the global and project config files)
    #[arg(long, global = true, env = "VIDSEEK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Machine-readable JSON output on stdout
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress log output
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_all_modalities() {
        let cli = Cli::try_parse_from([
            "vidseek", "--robot", "search", "-q", "rust", "-f", "cv.pdf", "-i", "cat.png", "-k", "3",
        ])
        .unwrap();
        assert!(cli.robot);
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query.as_deref(), Some("rust"));
                assert_eq!(args.file, Some(PathBuf::from("cv.pdf")));
                assert_eq!(args.image.as_deref(), Some("cat.png"));
                assert_eq!(args.top_k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_remove_requires_ids() {
        assert!(Cli::try_parse_from(["vidseek", "remove"]).is_err());
        assert!(Cli::try_parse_from(["vidseek", "remove", "a", "b"]).is_ok());
    }
}
