//! Container runtime boundary (the `docker` CLI).

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::config::ImageRecipe;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

pub const DOCKER: &str = "docker";

/// Thin wrapper over the `docker` CLI driven through a [`CommandRunner`].
pub struct ContainerRuntime<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ContainerRuntime<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    pub async fn image_exists(&self, tag: &str) -> Result<bool> {
        let output = self
            .runner
            .run(&CommandSpec::new(DOCKER).args(["images", "-q", tag]))
            .await?;
        if !output.is_success() {
            return Err(anyhow!(
                "`docker images -q {}` failed: {}",
                tag,
                output.failure_text()
            ));
        }
        Ok(!output.stdout.trim().is_empty())
    }

    pub async fn build_image(&self, recipe: &ImageRecipe) -> Result<()> {
        let spec = CommandSpec::new(DOCKER)
            .arg("build")
            .arg("-f")
            .arg(recipe.dockerfile.display().to_string())
            .arg("-t")
            .arg(&recipe.tag)
            .arg(recipe.context.display().to_string());
        let output = self.runner.run(&spec).await?;
        if !output.is_success() {
            return Err(anyhow!(
                "docker image build failed for {}: {}",
                recipe.tag,
                output.failure_text()
            ));
        }
        Ok(())
    }

    /// Build `recipe` unless an image with its tag is already present.
    ///
    /// Returns `true` when a build happened.
    pub async fn ensure_image(&self, recipe: &ImageRecipe) -> Result<bool> {
        if self.image_exists(&recipe.tag).await? {
            debug!(tag = %recipe.tag, "image present");
            return Ok(false);
        }
        info!(tag = %recipe.tag, dockerfile = %recipe.dockerfile.display(), "image missing, building");
        self.build_image(recipe).await?;
        info!(tag = %recipe.tag, "image built");
        Ok(true)
    }

    /// Stop and remove a container. Never fails; missing containers are fine.
    pub async fn force_remove(&self, name: &str) {
        for verb in ["stop", "rm"] {
            match self
                .runner
                .run(&CommandSpec::new(DOCKER).args([verb, name]))
                .await
            {
                Ok(out) if !out.is_success() => {
                    debug!(container = name, verb, detail = %out.failure_text(), "ignored")
                }
                Err(err) => debug!(container = name, verb, error = %err, "ignored"),
                Ok(_) => {}
            }
        }
    }

    /// `docker run -d ...`; returns the container id.
    pub async fn run_detached(&self, args: Vec<String>) -> Result<String> {
        let spec = CommandSpec::new(DOCKER).args(["run", "-d"]).args(args);
        let output = self.runner.run(&spec).await?;
        if !output.is_success() {
            return Err(anyhow!("`{}` failed: {}", spec, output.failure_text()));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// `docker run --rm ...`; the caller interprets the output.
    pub async fn run_once(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.runner.run(&spec).await
    }

    pub async fn logs(&self, name: &str) -> Option<CommandOutput> {
        self.runner
            .run(&CommandSpec::new(DOCKER).args(["logs", name]))
            .await
            .ok()
    }
}
