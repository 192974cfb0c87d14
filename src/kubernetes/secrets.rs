// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of credential values referenced from cloud specs.

use crate::error::{Result, SeedkeeperError};
use crate::types::cloud::GlobalSecretKeySelector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

/// Reads one key of a referenced Secret
#[async_trait]
pub trait SecretKeyGetter: Send + Sync {
    async fn get(&self, selector: &GlobalSecretKeySelector, key: &str) -> Result<String>;
}

/// Reads credential secrets from the seed cluster
pub struct SeedSecretKeyGetter {
    client: Client,
}

impl SeedSecretKeyGetter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretKeyGetter for SeedSecretKeyGetter {
    async fn get(&self, selector: &GlobalSecretKeySelector, key: &str) -> Result<String> {
        if selector.name.is_empty() || selector.namespace.is_empty() {
            return Err(SeedkeeperError::Credentials(
                "credentials reference must name a secret and its namespace".to_string(),
            ));
        }

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &selector.namespace);
        let secret = secrets.get(&selector.name).await?;

        let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) else {
            return Err(SeedkeeperError::Credentials(format!(
                "secret {}/{} has no key {}",
                selector.namespace, selector.name, key
            )));
        };

        String::from_utf8(value.0.clone()).map_err(|e| {
            SeedkeeperError::Credentials(format!(
                "secret {}/{} key {} is not valid UTF-8: {}",
                selector.namespace, selector.name, key, e
            ))
        })
    }
}
