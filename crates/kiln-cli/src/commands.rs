//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether an artifact is cached
    Has {
        /// Artifact id (usually the target name)
        id: String,

        /// Input fingerprint
        hash: String,
    },

    /// Restore a cached artifact
    Fetch {
        /// Artifact id
        id: String,

        /// Input fingerprint
        hash: String,

        /// Extract here instead of the artifact root
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Package outputs and store them in the cache
    Insert {
        /// Artifact id
        id: String,

        /// Output paths, relative to the artifact root
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Input fingerprint
        #[arg(long, conflicts_with = "inputs")]
        hash: Option<String>,

        /// Input files to fingerprint when no hash is given
        #[arg(long, num_args = 1..)]
        inputs: Vec<PathBuf>,
    },

    /// Remove an artifact from every tier
    Delete {
        /// Artifact id
        id: String,

        /// Input fingerprint
        hash: String,
    },

    /// Rank the endpoints of a mirror group by latency
    Probe {
        /// Mirror group, e.g. "https://a.example/cache|https://b.example/cache"
        group: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the default configuration file path
    Path,
}
