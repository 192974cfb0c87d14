// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedkeeperError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid cloud spec: {0}")]
    InvalidCloudSpec(String),

    #[error("{0}")]
    ImmutableField(String),

    #[error("updateCluster must not change cluster status")]
    StatusMutation,

    #[error("Cloud provider error: {0}")]
    Cloud(#[from] CloudApiError),

    #[error("Datacenter not found: {0}")]
    DatacenterNotFound(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Template rendering failed: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Addon manifest command failed: {0}")]
    AddonCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to reconcile {kind} {name}: {source}")]
    Reconcile {
        kind: String,
        name: String,
        #[source]
        source: Box<SeedkeeperError>,
    },
}

impl SeedkeeperError {
    /// Errors that will not resolve without a change to the object
    pub fn is_permanent(&self) -> bool {
        match self {
            SeedkeeperError::InvalidCloudSpec(_)
            | SeedkeeperError::ImmutableField(_)
            | SeedkeeperError::StatusMutation => true,
            SeedkeeperError::Reconcile { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    /// True for a 404 from either the Kubernetes API or a cloud API
    pub fn is_not_found(&self) -> bool {
        match self {
            SeedkeeperError::KubeError(kube::Error::Api(err)) => err.code == 404,
            SeedkeeperError::Cloud(err) => err.is_not_found(),
            SeedkeeperError::Reconcile { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// An error returned by a remote cloud API
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (status {status})")]
pub struct CloudApiError {
    /// HTTP status, 0 when the request never got a response
    pub status: u16,
    pub message: String,
}

impl CloudApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

pub type Result<T> = std::result::Result<T, SeedkeeperError>;
