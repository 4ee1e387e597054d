//! Container runtime collaborator.
//!
//! Everything the extraction pipeline needs from a container runtime sits
//! behind [`ContainerEngine`]: registry login, pull, metadata inspection,
//! one-shot script execution, and removal. [`PodmanEngine`] implements it
//! by shelling out to `podman`; tests substitute a mock.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::document::ImageMetadata;

/// Container runtime operations used by the extraction pipeline. Each call
/// blocks until the underlying operation completes or fails and can be
/// retried independently by the caller.
pub trait ContainerEngine {
    /// Returns the name of the engine for identification purposes.
    fn name(&self) -> &str;

    /// Authenticate against a registry. Failure is fatal for the batch.
    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()>;

    /// Pull an image by reference.
    fn pull(&self, image: &str) -> Result<()>;

    /// Inspect a local image. Unparseable inspect output degrades to empty
    /// metadata rather than failing the image.
    fn inspect(&self, image: &str) -> Result<ImageMetadata>;

    /// Run the inventory payload inside the image and capture its stdout.
    fn run_inventory(&self, image: &str, script: &str) -> Result<String>;

    /// Remove a local image. Removal is forced and never fatal.
    fn remove(&self, image: &str);
}

impl<T: ContainerEngine + ?Sized> ContainerEngine for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        (**self).login(registry, username, password)
    }

    fn pull(&self, image: &str) -> Result<()> {
        (**self).pull(image)
    }

    fn inspect(&self, image: &str) -> Result<ImageMetadata> {
        (**self).inspect(image)
    }

    fn run_inventory(&self, image: &str, script: &str) -> Result<String> {
        (**self).run_inventory(image, script)
    }

    fn remove(&self, image: &str) {
        (**self).remove(image)
    }
}

/// Podman implementation of the ContainerEngine trait.
pub struct PodmanEngine;

impl PodmanEngine {
    pub fn new() -> Result<Self> {
        let output = Command::new("podman")
            .arg("--version")
            .output()
            .context("Failed to execute podman command. Is podman installed?")?;

        if !output.status.success() {
            return Err(anyhow!("Podman is not available"));
        }

        Ok(Self)
    }

    fn run_command(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("podman")
            .args(args)
            .output()
            .context(format!("Failed to execute podman command: {:?}", args))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Podman command failed: {}", error.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ContainerEngine for PodmanEngine {
    fn name(&self) -> &str {
        "podman"
    }

    fn login(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        // Password goes over stdin so it never shows up in the process list.
        let mut child = Command::new("podman")
            .args(["login", registry, "--username", username, "--password-stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to execute podman login")?;

        child
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("Failed to open stdin for podman login"))?
            .write_all(format!("{}\n", password).as_bytes())
            .context("Failed to pass password to podman login")?;

        let output = child
            .wait_with_output()
            .context("Failed to wait for podman login")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(anyhow!("Login to {} failed: {}", registry, message.trim()));
        }
        Ok(())
    }

    fn pull(&self, image: &str) -> Result<()> {
        self.run_command(&["pull", image])
            .map(|_| ())
            .with_context(|| format!("Failed to pull {}", image))
    }

    fn inspect(&self, image: &str) -> Result<ImageMetadata> {
        let stdout = self.run_command(&["image", "inspect", "--format", "{{json .}}", image])?;
        match serde_json::from_str(stdout.trim()) {
            Ok(meta) => Ok(meta),
            Err(err) => {
                debug!("Unparseable inspect output for {}: {}", image, err);
                Ok(ImageMetadata::default())
            }
        }
    }

    fn run_inventory(&self, image: &str, script: &str) -> Result<String> {
        self.run_command(&["run", "--rm", image, "bash", "-lc", script])
            .with_context(|| format!("Inventory script failed in {}", image))
    }

    fn remove(&self, image: &str) {
        if let Err(err) = self.run_command(&["rmi", "--force", image]) {
            warn!("Could not remove image {}: {:#}", image, err);
        }
    }
}
