// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, tenant clients, patches, finalizers and events.

pub mod client;
pub mod conditions;
pub mod crd;
pub mod events;
pub mod finalizers;
pub mod patch;
pub mod secrets;

pub use client::{KubeconfigProvider, SecretKubeconfigProvider};
pub use crd::wait_for_crds;
pub use finalizers::{add_finalizers, remove_finalizers, FinalizerSet};
pub use patch::{patch_guarded, patch_status, update_cluster, update_cluster_validated};
pub use secrets::{SecretKeyGetter, SeedSecretKeyGetter};
