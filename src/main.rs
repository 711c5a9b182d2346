// ABOUTME: Entry point for the berth CLI application.
// ABOUTME: Parses arguments, sets up logging, and maps results to exit codes.

mod cli;
mod commands;

use berth::error::Result;
use berth::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, output.clone()).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    match cli.command {
        Commands::RunPipeline {
            config,
            destination,
            force,
        } => {
            let config = commands::load_config(config.as_deref(), destination.as_deref())?;
            commands::run_pipeline(config, force, output).await
        }
        Commands::Validate {
            config,
            destination,
        } => {
            let config = commands::load_config(config.as_deref(), destination.as_deref())?;
            commands::validate(&config, &output)
        }
        Commands::Init {
            pipeline,
            image,
            force,
        } => {
            let cwd = std::env::current_dir()?;
            let path =
                berth::config::init_config(&cwd, pipeline.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", path.display()));
            Ok(())
        }
    }
}
