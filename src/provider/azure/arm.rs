// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Minimal Azure Resource Manager client.
//!
//! Resources are addressed by [`ResourceId`] and exchanged as raw JSON so the
//! provider only has to know the handful of fields it reads.

use crate::error::CloudApiError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

const ARM_ENDPOINT: &str = "https://management.azure.com/";
const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com/";
const ARM_SCOPE: &str = "https://management.azure.com/.default";

const RESOURCES_API_VERSION: &str = "2021-04-01";
const NETWORK_API_VERSION: &str = "2023-09-01";
const COMPUTE_API_VERSION: &str = "2023-09-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Service principal used to talk to ARM
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub subscription_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceId {
    ResourceGroup {
        name: String,
    },
    VirtualNetwork {
        resource_group: String,
        name: String,
    },
    Subnet {
        resource_group: String,
        vnet: String,
        name: String,
    },
    RouteTable {
        resource_group: String,
        name: String,
    },
    SecurityGroup {
        resource_group: String,
        name: String,
    },
    AvailabilitySet {
        resource_group: String,
        name: String,
    },
}

impl ResourceId {
    /// ARM path below the subscription
    pub fn path(&self, subscription_id: &str) -> String {
        let base = format!("subscriptions/{}/resourceGroups", subscription_id);
        match self {
            ResourceId::ResourceGroup { name } => format!("{}/{}", base, name),
            ResourceId::VirtualNetwork {
                resource_group,
                name,
            } => format!(
                "{}/{}/providers/Microsoft.Network/virtualNetworks/{}",
                base, resource_group, name
            ),
            ResourceId::Subnet {
                resource_group,
                vnet,
                name,
            } => format!(
                "{}/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
                base, resource_group, vnet, name
            ),
            ResourceId::RouteTable {
                resource_group,
                name,
            } => format!(
                "{}/{}/providers/Microsoft.Network/routeTables/{}",
                base, resource_group, name
            ),
            ResourceId::SecurityGroup {
                resource_group,
                name,
            } => format!(
                "{}/{}/providers/Microsoft.Network/networkSecurityGroups/{}",
                base, resource_group, name
            ),
            ResourceId::AvailabilitySet {
                resource_group,
                name,
            } => format!(
                "{}/{}/providers/Microsoft.Compute/availabilitySets/{}",
                base, resource_group, name
            ),
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceId::ResourceGroup { .. } => RESOURCES_API_VERSION,
            ResourceId::AvailabilitySet { .. } => COMPUTE_API_VERSION,
            _ => NETWORK_API_VERSION,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::ResourceGroup { name } => write!(f, "resourceGroups/{}", name),
            ResourceId::VirtualNetwork { name, .. } => write!(f, "virtualNetworks/{}", name),
            ResourceId::Subnet { vnet, name, .. } => write!(f, "subnets/{}/{}", vnet, name),
            ResourceId::RouteTable { name, .. } => write!(f, "routeTables/{}", name),
            ResourceId::SecurityGroup { name, .. } => write!(f, "networkSecurityGroups/{}", name),
            ResourceId::AvailabilitySet { name, .. } => write!(f, "availabilitySets/{}", name),
        }
    }
}

/// Outcome of a delete request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deletion {
    /// The resource no longer exists
    Done,
    /// Azure accepted the request but is still deleting
    InProgress,
}

#[async_trait]
pub trait ArmApi: Send + Sync {
    async fn get(&self, id: &ResourceId) -> Result<Value, CloudApiError>;

    /// Create or replace a resource; returns the resource as stored
    async fn put(&self, id: &ResourceId, body: &Value) -> Result<Value, CloudApiError>;

    async fn delete(&self, id: &ResourceId) -> Result<Deletion, CloudApiError>;
}

/// Creates ARM clients for a set of credentials
pub trait ArmConnector: Send + Sync {
    fn connect(&self, credentials: AzureCredentials) -> Arc<dyn ArmApi>;
}

/// Connects through HTTPS with a shared connection pool
#[derive(Clone)]
pub struct HttpArmConnector {
    http: reqwest::Client,
}

impl HttpArmConnector {
    pub fn new() -> Result<Self, CloudApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CloudApiError::new(0, format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl Default for HttpArmConnector {
    fn default() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl ArmConnector for HttpArmConnector {
    fn connect(&self, credentials: AzureCredentials) -> Arc<dyn ArmApi> {
        Arc::new(ArmClient {
            http: self.http.clone(),
            credentials,
            token: Mutex::new(None),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

pub struct ArmClient {
    http: reqwest::Client,
    credentials: AzureCredentials,
    token: Mutex<Option<(String, Instant)>>,
}

impl ArmClient {
    async fn token(&self) -> Result<String, CloudApiError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < *expires {
                return Ok(token.clone());
            }
        }

        let url = Url::parse(LOGIN_ENDPOINT)
            .and_then(|u| u.join(&format!("{}/oauth2/v2.0/token", self.credentials.tenant_id)))
            .map_err(|e| CloudApiError::new(0, format!("invalid tenant ID: {}", e)))?;

        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", ARM_SCOPE),
            ])
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;
        let token: TokenResponse = response.json().await.map_err(request_error)?;

        let expires = Instant::now() + Duration::from_secs(token.expires_in);
        *cached = Some((token.access_token.clone(), expires));
        Ok(token.access_token)
    }

    fn url(&self, id: &ResourceId) -> Result<Url, CloudApiError> {
        let mut url = Url::parse(ARM_ENDPOINT)
            .and_then(|u| u.join(&id.path(&self.credentials.subscription_id)))
            .map_err(|e| CloudApiError::new(0, format!("invalid resource path for {}: {}", id, e)))?;
        url.query_pairs_mut()
            .append_pair("api-version", id.api_version());
        Ok(url)
    }
}

#[async_trait]
impl ArmApi for ArmClient {
    async fn get(&self, id: &ResourceId) -> Result<Value, CloudApiError> {
        debug!("GET {}", id);
        let response = self
            .http
            .get(self.url(id)?)
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(request_error)
    }

    async fn put(&self, id: &ResourceId, body: &Value) -> Result<Value, CloudApiError> {
        debug!("PUT {}", id);
        let response = self
            .http
            .put(self.url(id)?)
            .bearer_auth(self.token().await?)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;
        // Long-running creations may answer without a body
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, id: &ResourceId) -> Result<Deletion, CloudApiError> {
        debug!("DELETE {}", id);
        let response = self
            .http
            .delete(self.url(id)?)
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        check_status(response).await?;
        Ok(if status == StatusCode::ACCEPTED {
            Deletion::InProgress
        } else {
            Deletion::Done
        })
    }
}

fn request_error(e: reqwest::Error) -> CloudApiError {
    CloudApiError::new(
        e.status().map(|s| s.as_u16()).unwrap_or_default(),
        e.to_string(),
    )
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CloudApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(CloudApiError::new(status.as_u16(), message))
}
