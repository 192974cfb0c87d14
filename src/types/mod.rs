// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources consumed and managed by the controllers.

pub mod addon;
pub mod cloud;
pub mod cluster;
pub mod seed;

pub use addon::Addon;
pub use cloud::{CloudSpec, ProviderKind};
pub use cluster::Cluster;
pub use seed::{Datacenter, Seed};
