//! Command-line interface schema for dirsweep.
//!
//! Defines clap structs/enums for global flags and subcommands. Long-form
//! command text is sourced from `help_text`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod help_text;

/// Explicit logging level for CLI output.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Stateful directory-scanning engine: age and size retention policies
/// over a durable entry index
#[derive(Parser, Debug)]
#[command(
    name = "dirsweep",
    about,
    long_about = help_text::ROOT_LONG_ABOUT,
    disable_version_flag = true
)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug).
    /// Takes precedence over RUST_LOG.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Set log level explicitly (error, warn, info, debug, trace).
    /// Takes precedence over RUST_LOG.
    #[arg(
        long = "log-level",
        value_enum,
        value_name = "LEVEL",
        conflicts_with = "verbose",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile, enforce policy, dispatch hooks, and save
    #[command(long_about = help_text::SCAN_LONG_ABOUT)]
    Scan {
        /// Directory subtree to scan
        directory: PathBuf,

        /// Path to the state database (default: <directory>/.dirsweep.dat)
        #[arg(long, value_name = "PATH")]
        database: Option<PathBuf>,

        /// Remove entries whose canonical age exceeds this many days
        #[arg(long, value_name = "DAYS")]
        days: Option<f64>,

        /// Aggregate size limit: an absolute byte count or a "N%" of
        /// volume capacity
        #[arg(long, value_name = "SIZE")]
        max_size: Option<String>,

        /// Maximum recursion depth (0 = root's immediate children only)
        #[arg(long, value_name = "N")]
        depth: Option<u32>,

        /// Use access time in the canonical-timestamp precedence rule
        #[arg(long)]
        atime: bool,

        /// Use modification time in the canonical-timestamp precedence rule
        #[arg(long)]
        mtime: bool,

        /// Recompute the content checksum when mtime changes
        #[arg(long = "use-checksum")]
        use_checksum: bool,

        /// Recompute the content checksum periodically regardless of mtime
        #[arg(long = "use-checksum-always", conflicts_with = "use_checksum")]
        use_checksum_always: bool,

        /// Minimum interval, in days, between forced re-hashes under
        /// --use-checksum-always
        #[arg(long, value_name = "DAYS", default_value_t = 7.0)]
        check_window: f64,

        /// Retain a stat() result across repeated property reads within
        /// one scan
        #[arg(long)]
        cache_attrs: bool,

        /// Skip traversal entirely when the root directory is unchanged
        /// since the last successful save
        #[arg(long)]
        minimal_scan: bool,

        /// Remove directories left empty by policy-driven removals
        #[arg(long)]
        prune_dirs: bool,

        /// Retry removals under elevated privilege (sudo) if the initial
        /// attempt fails
        #[arg(long)]
        sudo: bool,

        /// Dispatch hooks but never mutate the filesystem
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Shell out to a secure-wipe tool (e.g. shred) instead of unlink
        #[arg(long, value_name = "TOOL")]
        secure_wipe: Option<String>,

        /// Bytes of freshly hashed content between checkpoint saves
        #[arg(long, value_name = "BYTES", default_value_t = 10 * 1024 * 1024 * 1024)]
        checkpoint_bytes: u64,

        /// Shell command run on each entry past the age/size limit; `%s`
        /// is replaced with the entry's path. Defaults to removing the
        /// entry directly.
        #[arg(long, value_name = "CMD")]
        on_past_limit: Option<String>,
    },

    /// Reconcile and report; evaluates no policy and dispatches no hook
    #[command(long_about = help_text::STATUS_LONG_ABOUT)]
    Status {
        /// Directory subtree to inspect
        directory: PathBuf,

        /// Path to the state database (default: <directory>/.dirsweep.dat)
        #[arg(long, value_name = "PATH")]
        database: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
