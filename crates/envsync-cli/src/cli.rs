//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

/// envsync - Review and push staging changes to production
#[derive(Parser, Debug)]
#[command(name = "envsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the manifest
    #[arg(
        short,
        long,
        global = true,
        env = "ENVSYNC_CONFIG",
        default_value = "envsync.toml"
    )]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show what differs between the source and the destination
    ///
    /// Examples:
    ///   envsync diff                 # Files and database
    ///   envsync diff --files         # File tree only
    ///   envsync diff --database --json
    #[command(group(ArgGroup::new("scope").args(["files", "database"])))]
    Diff {
        /// Only diff the file trees
        #[arg(long)]
        files: bool,

        /// Only diff the databases
        #[arg(long)]
        database: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show database changes grouped into content units
    Groups {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Show a unified diff of one file
    Preview {
        /// Path relative to the environment roots
        path: String,
    },

    /// Record the destination's current state as known-synchronized
    Baseline,

    /// List recorded conflicts
    Conflicts {
        /// Run conflict detection for these items first
        #[arg(long, value_name = "ITEM", num_args = 1..)]
        detect: Vec<String>,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Settle a conflict
    ///
    /// A custom value is file content for file items and a JSON object of
    /// columns for rows.
    #[command(group(ArgGroup::new("decision").required(true).args(["source", "destination", "custom"])))]
    Resolve {
        /// Conflict id
        id: String,

        /// Push the source value
        #[arg(long)]
        source: bool,

        /// Keep the destination value
        #[arg(long)]
        destination: bool,

        /// Push this value instead
        #[arg(long, value_name = "VALUE")]
        custom: Option<String>,
    },

    /// Apply selected changes to the destination
    ///
    /// Items are `file:<path>` (or a bare path), `row:<table>/<key>` or
    /// `group:<id>`.
    Sync {
        /// Items to apply
        #[arg(required = true, value_name = "ITEM")]
        items: Vec<String>,

        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
}
