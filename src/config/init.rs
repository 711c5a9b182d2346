// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates berth.yml template files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ImageReference, PipelineName};

use super::{CONFIG_FILENAME, Config};

/// Write a starter `berth.yml` into `dir` and return its path.
pub fn init_config(
    dir: &Path,
    pipeline: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(name) = pipeline {
        config.pipeline =
            PipelineName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image = ImageReference::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;
    Ok(config_path)
}

fn generate_template_yaml(config: &Config) -> String {
    let (server, port) = match &config.deploy {
        Some(deploy) => (
            format!(
                "{}@{}:{}",
                deploy.server.user, deploy.server.host, deploy.server.port
            ),
            deploy.port.to_string(),
        ),
        None => ("deploy@server.example.com:22".to_string(), "8080".to_string()),
    };

    format!(
        r#"pipeline: {pipeline}
image: {image}
stages: [test, build, deploy]

test:
  commands:
    - {test_command}
  timeout: 10m

build:
  context: .
  dockerfile: Dockerfile
  timeout: 30m

# registry:
#   server: registry.example.com
#   username: {{ env: REGISTRY_USER }}
#   password: {{ env: REGISTRY_PASSWORD }}
#   retries: 3
#   backoff: 1s

deploy:
  server: {server}
  key: {{ env: SSH_PRIVATE_KEY }}
  # strict (default) only trusts keys in known_hosts; accept-new records
  # unknown keys; skip disables verification entirely
  host_key_policy: strict
  port: "{port}"
  restart: unless-stopped
"#,
        pipeline = config.pipeline,
        image = config.image,
        test_command = config
            .test
            .commands
            .first()
            .map(String::as_str)
            .unwrap_or("make test"),
    )
}
