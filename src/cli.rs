// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Test, build, push and deploy a container image to a host over SSH")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print stage events and results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured stages: test, build and push, deploy
    RunPipeline {
        /// Pipeline config file (default: berth.yml in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Break an existing deploy lock held by another run
        #[arg(long)]
        force: bool,
    },

    /// Load the config and check stage wiring without running anything
    Validate {
        /// Pipeline config file (default: berth.yml in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Write a starter berth.yml into the current directory
    Init {
        /// Pipeline name
        #[arg(long)]
        pipeline: Option<String>,

        /// Image reference to build and deploy
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing berth.yml
        #[arg(long)]
        force: bool,
    },
}
