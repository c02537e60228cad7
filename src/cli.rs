use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cliphost")]
#[command(author, version, about = "Clip hosting backend with DASH transcoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the public and internal servers
    Start {
        /// Public host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Public port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a source and show the quality ladder it would get
    Probe {
        /// File or URL to probe
        #[arg(required = true)]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
