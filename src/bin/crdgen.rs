// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResourceExt;
use seedkeeper::types::{Addon, Cluster, Seed};

fn main() -> anyhow::Result<()> {
    for crd in [Cluster::crd(), Addon::crd(), Seed::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
