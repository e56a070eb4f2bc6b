use clap::{Parser, Subcommand};
use omni_core::types::{HandlePath, OutputFormat};

#[derive(Parser)]
#[command(name = "omni")]
#[command(about = "omni: layered configuration and repository environment setup")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory (defaults to CWD)
    #[arg(long, global = true)]
    pub cd: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up the current repository from its `up` configuration
    Up {
        /// Whether paths declared by the repository should be added to
        /// your configuration (yes, ask, no)
        #[arg(
            long,
            value_enum,
            default_value = "no",
            num_args = 0..=1,
            default_missing_value = "ask"
        )]
        handle_path: HandlePath,
    },

    /// Tear down the current repository, undoing `up` in reverse order
    Down,

    /// Inspect the merged configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the merged configuration
    Show,

    /// Print the effective omnipath, one entry per line
    Path {
        /// Leave out paths declared by the current repository
        #[arg(long)]
        no_local: bool,
    },

    /// Print the effective organizations
    Org,

    /// List the configuration files that were loaded
    Files,

    /// Get a merged config value by dotted key path (e.g., path.append)
    Get {
        /// Dotted key path
        key: String,

        /// Value printed when the key is absent
        #[arg(long)]
        default: Option<String>,
    },
}
