// ABOUTME: Image builds through the container CLI.
// ABOUTME: Validates the build descriptor before invoking the backend.

use crate::exec::{CommandLine, CommandRunner, ExecError};
use crate::runtime::RuntimeType;
use crate::types::ImageReference;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build descriptor not found: {}", .0.display())]
    MissingDescriptor(PathBuf),

    #[error("build backend failed with exit code {exit_code}: {detail}")]
    BackendFailed { exit_code: u32, detail: String },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Directory, descriptor and build arguments for one image build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    descriptor: PathBuf,
    args: BTreeMap<String, String>,
}

impl BuildContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            descriptor: PathBuf::from("Dockerfile"),
            args: BTreeMap::new(),
        }
    }

    /// Descriptor path, relative to the context root unless absolute.
    pub fn descriptor(mut self, descriptor: impl Into<PathBuf>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn build_args(mut self, args: BTreeMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(&self.descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        let path = self.descriptor_path();
        if path.is_file() {
            Ok(())
        } else {
            Err(BuildError::MissingDescriptor(path))
        }
    }
}

/// Produces tagged images with `docker build` or `podman build`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactBuilder {
    runtime: RuntimeType,
}

impl ArtifactBuilder {
    pub fn new(runtime: RuntimeType) -> Self {
        Self { runtime }
    }

    pub fn command<'a>(&self, context: &BuildContext, image: &ImageReference) -> CommandLine<'a> {
        let mut command = CommandLine::new(self.runtime.binary())
            .arg("build")
            .arg("-f")
            .arg(context.descriptor_path().to_string_lossy())
            .arg("-t")
            .arg(image.to_string());
        for (key, value) in &context.args {
            command = command.arg("--build-arg").arg(format!("{key}={value}"));
        }
        command.arg(context.root.to_string_lossy())
    }

    /// Build `image` from `context`. Failures are reported, never retried.
    pub async fn build<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        context: &BuildContext,
        image: &ImageReference,
    ) -> Result<ImageReference> {
        context.validate()?;

        let command = self.command(context, image);
        tracing::info!(%image, context = %context.root.display(), "building image");

        let output = runner.run(&command).await?;
        if !output.success() {
            let detail = last_lines(&output.stderr, 20);
            return Err(BuildError::BackendFailed {
                exit_code: output.exit_code,
                detail,
            });
        }

        tracing::debug!(%image, "build finished");
        Ok(image.clone())
    }
}

/// Build logs are long; keep the tail, where the error usually is.
fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn command_includes_descriptor_tag_and_args() {
        let ctx = BuildContext::new("/src/app")
            .descriptor("docker/Dockerfile.prod")
            .build_arg("VERSION", "1.0")
            .build_arg("COMMIT", "abc");
        let image = ImageReference::parse("demo:1.0").unwrap();
        let cmd = ArtifactBuilder::new(RuntimeType::Podman).command(&ctx, &image);
        assert_eq!(
            cmd.to_shell(),
            "podman build -f /src/app/docker/Dockerfile.prod -t demo:1.0 \
             --build-arg COMMIT=abc --build-arg VERSION=1.0 /src/app"
        );
    }

    #[test]
    fn validate_reports_missing_descriptor() {
        let dir = TempDir::new().unwrap();
        let ctx = BuildContext::new(dir.path());
        match ctx.validate() {
            Err(BuildError::MissingDescriptor(path)) => {
                assert_eq!(path, dir.path().join("Dockerfile"));
            }
            other => panic!("expected MissingDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_existing_descriptor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        assert!(BuildContext::new(dir.path()).validate().is_ok());
    }

    #[test]
    fn last_lines_keeps_tail() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
    }
}
