// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod addon;
pub mod config;
pub mod constants;
pub mod error;
pub mod kubernetes;
pub mod provider;
pub mod reconcilers;
pub mod reconciling;
pub mod types;
pub mod validation;

#[cfg(test)]
pub mod test_utils;
