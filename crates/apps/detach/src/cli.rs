//! Command-line interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use mail::ProcessAction;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "detach")]
#[command(version)]
#[command(about = "Find large Gmail attachments, save them locally and strip them from the mailbox", long_about = None)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the user labels that basic search can filter on
    Labels,

    /// Search for messages with large attachments and list them
    Search(SearchArgs),

    /// Search, then download and/or remove attachments of every match
    Process(ProcessArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Raw Gmail query; overrides --min-size and --label
    #[arg(short, long)]
    pub query: Option<String>,

    /// Minimum message size in megabytes
    #[arg(long = "min-size")]
    pub min_size_mb: Option<u64>,

    /// Only messages carrying one of these labels (repeatable)
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Message ids fetched per search batch
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// What to do with the attachments
    #[arg(short, long, value_enum, default_value_t = Action::Download)]
    pub action: Action,

    /// Directory attachments are saved to (remembered for next time)
    #[arg(short, long)]
    pub target_dir: Option<PathBuf>,

    /// File name schema, e.g. "{date}_{from}_{filename}"
    #[arg(long)]
    pub schema: Option<String>,

    /// Describe the removed attachment in the placeholder text
    #[arg(long)]
    pub add_metadata: bool,

    /// Save the original message before removing anything
    #[arg(long)]
    pub backup: bool,

    /// Open the target directory when done
    #[arg(long)]
    pub open: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Download,
    Delete,
    DownloadAndDelete,
}

impl From<Action> for ProcessAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Download => ProcessAction::Download,
            Action::Delete => ProcessAction::Delete,
            Action::DownloadAndDelete => ProcessAction::DownloadAndDelete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process_command() {
        let cli = Cli::parse_from([
            "detach",
            "process",
            "--action",
            "download-and-delete",
            "--min-size",
            "20",
            "-l",
            "Work",
            "-l",
            "Receipts",
            "--target-dir",
            "/tmp/out",
        ]);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(ProcessAction::from(args.action), ProcessAction::DownloadAndDelete);
                assert_eq!(args.search.min_size_mb, Some(20));
                assert_eq!(args.search.labels, vec!["Work", "Receipts"]);
                assert_eq!(args.target_dir, Some(PathBuf::from("/tmp/out")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
