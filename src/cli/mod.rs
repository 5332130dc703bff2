use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Logs go to stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Pack a comic directory tree into a .pkz archive.
    #[command(alias = "c")]
    Pack {
        /// Root directory: one sub-directory per comic, then volumes, then chapters holding pictures.
        #[arg(required = true)]
        input: PathBuf,

        /// The path for the output archive file (e.g., comics.pkz).
        #[arg(short, long)]
        output: PathBuf,

        /// Deflate level (0-9). Higher levels compress better at the cost of speed.
        #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Store the PKZ-INFO index with plain deflate instead of the obfuscated method.
        #[arg(long)]
        plain_index: bool,

        /// Show a progress line on stderr.
        #[arg(long)]
        progress: bool,
    },

    /// Print the archive index summary.
    #[command(alias = "l")]
    Info {
        /// The archive file to inspect.
        #[arg(required = true)]
        archive: PathBuf,

        /// Print every comic, volume, chapter and picture.
        #[arg(long)]
        tree: bool,

        /// Print the raw JSON index instead of the summary.
        #[arg(long, conflicts_with = "tree")]
        json: bool,
    },

    /// Write one decoded entry to a file or to stdout.
    Cat {
        /// The archive file to read from.
        #[arg(required = true)]
        archive: PathBuf,

        /// Entry name as stored in the index (a *_path value, or PKZ-INFO).
        #[arg(required = true)]
        entry: String,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check counters, indices and every referenced entry.
    Verify {
        /// The archive file to verify.
        #[arg(required = true)]
        archive: PathBuf,
    },

    /// Extract every asset into a directory tree that `pack` can read back.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where the tree will be created.
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Maps `-v` occurrences to a log level; warnings are always shown.
pub fn log_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::parse())
}
