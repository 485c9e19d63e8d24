use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "vid_clip_finder",
    version,
    about = "Find which video of a collection a short clip was taken from, and at what timestamp"
)]
pub struct Args {
    /// Directory holding the video collection. The fingerprint store lives
    /// inside it.
    #[arg(short = 'c', long)]
    pub collection: PathBuf,

    /// Print more log output (can be given twice).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print errors only.
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the store with the files currently in the collection.
    Sync,

    /// Fingerprint synced videos that are missing fingerprints.
    Fingerprint {
        /// Recompute fingerprints even for videos that already hold them
        /// (use after an algorithm change).
        #[arg(long)]
        rerun: bool,
    },

    /// Locate the video and timestamp a clip was taken from.
    Query {
        /// The clip to look up.
        clip: PathBuf,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the store lifecycle state and entry count.
    Status,
}

pub fn parse_args() -> Args {
    Args::parse()
}
