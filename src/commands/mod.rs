// ABOUTME: Command module aggregator for the berth CLI.
// ABOUTME: Re-exports run-pipeline and validate handlers plus config loading.

mod run_pipeline;
mod validate;

pub use run_pipeline::run_pipeline;
pub use validate::validate;

use berth::config::Config;
use berth::error::Result;
use std::path::Path;

/// Load the config from `path` or the current directory, then apply a destination.
pub fn load_config(path: Option<&Path>, destination: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };

    match destination {
        Some(name) => config.for_destination(name),
        None => Ok(config),
    }
}
