// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the Seed object holding the datacenter definitions
    pub seed_name: String,
    /// Namespace of the Seed object and of shared credential secrets
    pub namespace: String,
    /// Only clusters labeled with this worker name are reconciled
    pub worker_name: String,
    /// Maximum number of clusters that may be mid-update at the same time
    pub concurrent_cluster_updates: usize,
    /// Concurrent reconcile workers per controller
    pub workers: u16,
    pub addon_dir: PathBuf,
    /// Zero disables periodic re-enforcement of addons
    pub addon_enforce_interval: Duration,
    pub kubectl_binary: String,
    pub addon_apply_timeout: Duration,
    pub testing_mode: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let seed_name = env::var("SEED_NAME").context("SEED_NAME environment variable not set")?;
        let namespace = env::var("KUBERMATIC_NAMESPACE").unwrap_or_else(|_| "kubermatic".to_string());
        let worker_name = env::var("WORKER_NAME").unwrap_or_default();
        let concurrent_cluster_updates = parse_var("CONCURRENT_CLUSTER_UPDATES", 3)?;
        let workers = parse_var("WORKER_COUNT", 4)?;
        let addon_dir = PathBuf::from(env::var("ADDON_DIR").unwrap_or_else(|_| "/opt/addons".to_string()));
        let addon_enforce_interval =
            Duration::from_secs(parse_var::<u64>("ADDON_ENFORCE_INTERVAL_MINUTES", 5)? * 60);
        let kubectl_binary = env::var("KUBECTL_BINARY").unwrap_or_else(|_| "kubectl".to_string());
        let addon_apply_timeout = Duration::from_secs(parse_var("ADDON_APPLY_TIMEOUT_SECS", 300)?);
        // For testing, uses the KUBECONFIG env var to create tenant clients instead of fetching kubeconfig from secrets
        let testing_mode: bool = env::var("TESTING_MODE").unwrap_or("false".to_string()).parse().unwrap_or(false);

        Ok(Config {
            seed_name,
            namespace,
            worker_name,
            concurrent_cluster_updates,
            workers,
            addon_dir,
            addon_enforce_interval,
            kubectl_binary,
            addon_apply_timeout,
            testing_mode,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed_name: "europe-west".to_string(),
            namespace: "kubermatic".to_string(),
            worker_name: String::new(),
            concurrent_cluster_updates: 3,
            workers: 4,
            addon_dir: PathBuf::from("/opt/addons"),
            addon_enforce_interval: Duration::from_secs(300),
            kubectl_binary: "kubectl".to_string(),
            addon_apply_timeout: Duration::from_secs(300),
            testing_mode: false,
        }
    }
}
