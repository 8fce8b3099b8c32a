// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "motion_driver")]
#[command(author, version, about = "PIR motion sensor driver with LED feedback")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the driver on the simulated GPIO backend
    Run {
        /// Config file (TOML); defaults apply when omitted
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the run directory for class/node files
        #[arg(long, value_name = "DIR")]
        run_dir: Option<PathBuf>,

        /// Milliseconds between simulated motion edges
        #[arg(long, default_value_t = 2000)]
        sim_interval_ms: u64,

        /// Stop after this many simulated edges (run forever when omitted)
        #[arg(long)]
        edges: Option<u32>,
    },

    /// Print the effective configuration and exit
    Config {
        /// Config file (TOML); defaults apply when omitted
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}
