// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{GROUP, POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Kinds the controllers watch; all must be served before they start
const REQUIRED_KINDS: [&str; 3] = ["Cluster", "Addon", "Seed"];

/// Wait for the kubermatic.k8c.io CRDs to become available in the seed.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_crds(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match missing_kinds(client).await {
            Ok(missing) if missing.is_empty() => {
                info!("CRDs ({}/v1) are available", GROUP);
                return Ok(());
            }
            Ok(missing) => {
                info!(
                    "CRDs {:?} ({}/v1) not yet available, waiting {} seconds...",
                    missing, GROUP, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for CRDs: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn missing_kinds(client: &Client) -> Result<Vec<&'static str>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[GROUP])
        .run()
        .await?;

    let mut served = Vec::new();
    for group in discovery.groups() {
        if group.name() == GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.version == "v1" {
                    served.push(ar.kind);
                }
            }
        }
    }

    Ok(REQUIRED_KINDS
        .iter()
        .copied()
        .filter(|kind| !served.iter().any(|s| s.as_str() == *kind))
        .collect())
}
