// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use seedkeeper::addon::KubectlApplier;
use seedkeeper::config::Config;
use seedkeeper::kubernetes::{wait_for_crds, SecretKubeconfigProvider, SeedSecretKeyGetter};
use seedkeeper::provider::{HttpArmConnector, ProviderRegistry};
use seedkeeper::reconcilers::{AddonReconciler, ClusterReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting seedkeeper");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        "Configuration loaded: seed={}, worker_name={:?}, concurrent_cluster_updates={}",
        config.seed_name, config.worker_name, config.concurrent_cluster_updates
    );

    let client = Client::try_default().await?;
    info!("Connected to seed cluster");

    info!("Waiting for kubermatic CRDs to become available...");
    wait_for_crds(&client).await?;

    let secrets = Arc::new(SeedSecretKeyGetter::new(client.clone()));
    let arm = Arc::new(HttpArmConnector::new().context("failed to set up the Azure client")?);
    let providers = Arc::new(ProviderRegistry::new(
        client.clone(),
        &config.namespace,
        &config.seed_name,
        secrets.clone(),
        arm,
    ));
    let kubeconfigs = Arc::new(SecretKubeconfigProvider::new(client.clone(), config.testing_mode));
    let applier = Arc::new(KubectlApplier::new(&config.kubectl_binary, config.addon_apply_timeout));

    let cluster_reconciler =
        ClusterReconciler::new(client.clone(), config.clone(), providers, kubeconfigs.clone());
    let addon_reconciler = AddonReconciler::new(client, config, kubeconfigs, secrets, applier);

    info!("Starting reconcilers...");
    tokio::try_join!(cluster_reconciler.run(), addon_reconciler.run())?;

    warn!("All reconcilers stopped");
    Ok(())
}
