// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applies and deletes rendered addon manifests in a tenant cluster.

use crate::error::{Result, SeedkeeperError};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait ManifestApplier: Send + Sync {
    /// Apply `manifest`, pruning objects matching `selector` that it no longer contains
    async fn apply(&self, kubeconfig: &[u8], manifest: &str, selector: &str) -> Result<()>;

    /// Delete every object of `manifest`, ignoring objects that are already gone
    async fn delete(&self, kubeconfig: &[u8], manifest: &str) -> Result<()>;
}

/// Runs kubectl against temporary kubeconfig and manifest files
pub struct KubectlApplier {
    binary: PathBuf,
    timeout: Duration,
}

impl KubectlApplier {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn apply_args(kubeconfig: &Path, manifest: &Path, selector: &str) -> Vec<String> {
        vec![
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
            "apply".to_string(),
            "--prune".to_string(),
            "--filename".to_string(),
            manifest.display().to_string(),
            "--selector".to_string(),
            selector.to_string(),
        ]
    }

    fn delete_args(kubeconfig: &Path, manifest: &Path) -> Vec<String> {
        vec![
            "--kubeconfig".to_string(),
            kubeconfig.display().to_string(),
            "delete".to_string(),
            "--filename".to_string(),
            manifest.display().to_string(),
            "--ignore-not-found".to_string(),
        ]
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                SeedkeeperError::AddonCommand(format!(
                    "{} did not finish within {}s",
                    self.binary.display(),
                    self.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(SeedkeeperError::AddonCommand(format!(
                "{} failed ({}): {}",
                self.binary.display(),
                output.status,
                combined.trim()
            )));
        }
        Ok(())
    }
}

fn temp_file(content: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

#[async_trait]
impl ManifestApplier for KubectlApplier {
    #[instrument(skip(self, kubeconfig, manifest))]
    async fn apply(&self, kubeconfig: &[u8], manifest: &str, selector: &str) -> Result<()> {
        let kubeconfig = temp_file(kubeconfig)?;
        let manifest = temp_file(manifest.as_bytes())?;
        self.run(Self::apply_args(kubeconfig.path(), manifest.path(), selector))
            .await?;
        info!("Applied addon manifest");
        Ok(())
    }

    #[instrument(skip(self, kubeconfig, manifest))]
    async fn delete(&self, kubeconfig: &[u8], manifest: &str) -> Result<()> {
        let kubeconfig = temp_file(kubeconfig)?;
        let manifest = temp_file(manifest.as_bytes())?;
        self.run(Self::delete_args(kubeconfig.path(), manifest.path()))
            .await?;
        info!("Deleted addon manifest");
        Ok(())
    }
}
