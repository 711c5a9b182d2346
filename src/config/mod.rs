// ABOUTME: Configuration types and parsing for berth.yml.
// ABOUTME: Handles YAML parsing, env var interpolation, and destination merging.

mod deserialize;
mod env_value;
mod init;
mod restart_policy;
mod target;

pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use restart_policy::RestartPolicy;
pub use target::RemoteTarget;

use deserialize::{
    deserialize_image_ref, deserialize_image_ref_option, deserialize_pipeline_name,
    deserialize_stages, deserialize_target, deserialize_target_option,
};

use crate::build::BuildContext;
use crate::credential::{Credential, Credentials, RegistryLogin};
use crate::error::{Error, Result};
use crate::pipeline::StageKind;
use crate::registry::RetryPolicy;
use crate::runtime::RuntimeType;
use crate::ssh::HostKeyPolicy;
use crate::types::{ImageReference, PipelineName, PortBinding};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "berth.yml";
pub const CONFIG_FILENAME_ALT: &str = "berth.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".berth/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_pipeline_name")]
    pub pipeline: PipelineName,

    #[serde(deserialize_with = "deserialize_image_ref")]
    pub image: ImageReference,

    #[serde(default = "default_stages", deserialize_with = "deserialize_stages")]
    pub stages: NonEmpty<StageKind>,

    /// CLI used for local builds and pushes.
    #[serde(default)]
    pub runtime: RuntimeType,

    #[serde(default)]
    pub test: TestConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    #[serde(default)]
    pub deploy: Option<DeployConfig>,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,

    /// Directory relative paths resolve against; the config file's directory.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_stages() -> NonEmpty<StageKind> {
    NonEmpty::from((StageKind::Test, vec![StageKind::Build, StageKind::Deploy]))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub commands: Vec<String>,

    #[serde(default = "default_test_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            timeout: default_test_timeout(),
        }
    }
}

fn default_test_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_build_context")]
    pub context: PathBuf,

    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,

    #[serde(default)]
    pub args: BTreeMap<String, EnvValue>,

    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            context: default_build_context(),
            dockerfile: default_dockerfile(),
            args: BTreeMap::new(),
            timeout: default_build_timeout(),
        }
    }
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry host; the CLI's default registry when unset.
    #[serde(default)]
    pub server: Option<String>,

    pub username: EnvValue,

    pub password: EnvValue,

    #[serde(flatten)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    #[serde(deserialize_with = "deserialize_target")]
    pub server: RemoteTarget,

    /// Private key material, usually `{ env: SSH_PRIVATE_KEY }`.
    #[serde(default)]
    pub key: Option<EnvValue>,

    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Overrides the policy given on `server`.
    #[serde(default)]
    pub host_key_policy: Option<HostKeyPolicy>,

    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    pub port: PortBinding,

    /// Remote CLI; detected when unset.
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub container_name: Option<String>,

    #[serde(default)]
    pub restart: Option<RestartPolicy>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

impl DeployConfig {
    /// The SSH target with deploy-level host key settings applied.
    pub fn target(&self) -> RemoteTarget {
        let mut target = self.server.clone();
        if let Some(policy) = self.host_key_policy {
            target.host_key_policy = policy;
        }
        if self.known_hosts.is_some() {
            target.known_hosts = self.known_hosts.clone();
        }
        target
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default, deserialize_with = "deserialize_image_ref_option")]
    pub image: Option<ImageReference>,

    #[serde(default)]
    pub deploy: Option<DeployOverride>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeployOverride {
    #[serde(default, deserialize_with = "deserialize_target_option")]
    pub server: Option<RemoteTarget>,

    #[serde(default)]
    pub port: Option<PortBinding>,

    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub host_key_policy: Option<HostKeyPolicy>,

    #[serde(default)]
    pub container_name: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Config {
    /// Parse without validation; `base_dir` is the current directory.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.base_dir = PathBuf::from(".");
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), pipeline = %config.pipeline, "loaded config");
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Cross-field checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.has_stage(StageKind::Test) && self.test.commands.is_empty() {
            return Err(Error::InvalidConfig(
                "test stage enabled but test.commands is empty".to_string(),
            ));
        }

        if self.has_stage(StageKind::Deploy) && self.deploy.is_none() {
            return Err(Error::InvalidConfig(
                "deploy stage enabled but no deploy section".to_string(),
            ));
        }

        if let Some(deploy) = &self.deploy
            && deploy.key.is_some()
            && deploy.key_file.is_some()
        {
            return Err(Error::InvalidConfig(
                "deploy.key and deploy.key_file are mutually exclusive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn has_stage(&self, stage: StageKind) -> bool {
        self.stages.iter().any(|s| *s == stage)
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(image) = &dest.image {
            merged.image = image.clone();
        }

        if let Some(overrides) = &dest.deploy {
            let deploy = merged.deploy.as_mut().ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "destination '{name}' overrides deploy settings but there is no deploy section"
                ))
            })?;

            if let Some(server) = &overrides.server {
                deploy.server = server.clone();
            }
            if let Some(port) = overrides.port {
                deploy.port = port;
            }
            if overrides.runtime.is_some() {
                deploy.runtime = overrides.runtime;
            }
            if overrides.host_key_policy.is_some() {
                deploy.host_key_policy = overrides.host_key_policy;
            }
            if overrides.container_name.is_some() {
                deploy.container_name = overrides.container_name.clone();
            }
            for (k, v) in &overrides.labels {
                deploy.labels.insert(k.clone(), v.clone());
            }
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Resolve a config-relative path.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        let path = target::expand_home(path);
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn build_context(&self) -> Result<BuildContext> {
        Ok(BuildContext::new(self.resolve_path(&self.build.context))
            .descriptor(&self.build.dockerfile)
            .build_args(resolve_env_map(&self.build.args)?))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.registry
            .as_ref()
            .map(|r| r.retry)
            .unwrap_or_default()
    }

    /// Resolve every secret the enabled stages need.
    pub fn credentials(&self) -> Result<Credentials> {
        let needs_registry = self.has_stage(StageKind::Build) || self.has_stage(StageKind::Deploy);

        let registry = match &self.registry {
            Some(registry) if needs_registry => Some(RegistryLogin {
                server: registry.server.clone(),
                username: registry.username.resolve()?,
                password: registry.password.resolve_credential("registry.password")?,
            }),
            _ => None,
        };

        let ssh_key = match &self.deploy {
            Some(deploy) if self.has_stage(StageKind::Deploy) => self.ssh_key(deploy)?,
            _ => None,
        };

        Ok(Credentials { registry, ssh_key })
    }

    fn ssh_key(&self, deploy: &DeployConfig) -> Result<Option<Credential>> {
        if let Some(key) = &deploy.key {
            return key.resolve_credential("deploy.key").map(Some);
        }
        if let Some(path) = &deploy.key_file {
            let path = self.resolve_path(path);
            let material = std::fs::read_to_string(&path)?;
            return Ok(Some(Credential::new("deploy.key_file", material)));
        }
        Ok(None)
    }

    pub fn template() -> Self {
        Config {
            pipeline: PipelineName::new("my-app").expect("valid template name"),
            image: ImageReference::parse("registry.example.com/my-app:latest")
                .expect("valid template image"),
            stages: default_stages(),
            runtime: RuntimeType::default(),
            test: TestConfig {
                commands: vec!["make test".to_string()],
                ..Default::default()
            },
            build: BuildConfig::default(),
            registry: None,
            deploy: Some(DeployConfig {
                server: RemoteTarget::parse("deploy@server.example.com:22")
                    .expect("valid template target"),
                key: Some(EnvValue::FromEnv {
                    var: "SSH_PRIVATE_KEY".to_string(),
                    default: None,
                }),
                key_file: None,
                host_key_policy: None,
                known_hosts: None,
                port: PortBinding::same(8080),
                runtime: None,
                container_name: None,
                restart: Some(RestartPolicy::UnlessStopped),
                labels: BTreeMap::new(),
                stop_timeout: default_stop_timeout(),
                command_timeout: default_command_timeout(),
                timeout: default_deploy_timeout(),
            }),
            destinations: HashMap::new(),
            base_dir: PathBuf::from("."),
        }
    }
}
