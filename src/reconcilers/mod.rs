// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to watch events.

pub mod addon;
pub mod cluster;
mod deletion;
pub mod health;
mod resources;
pub mod wrapper;

pub use addon::AddonReconciler;
pub use cluster::ClusterReconciler;
