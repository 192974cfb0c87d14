// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Finalizers placed on Cluster objects.
///
/// These strings are persisted on live objects; renaming one strands the
/// deletion of every cluster that already carries it.
pub mod finalizers {
    pub const CONSTRAINTS_CLEANUP: &str = "kubermatic.k8c.io/cleanup-kubermatic-constraints";
    pub const IN_CLUSTER_LB_CLEANUP: &str = "kubermatic.k8c.io/cleanup-in-cluster-lb";
    pub const IN_CLUSTER_PV_CLEANUP: &str = "kubermatic.k8c.io/cleanup-in-cluster-pv";
    pub const ETCD_BACKUP_CONFIG_CLEANUP: &str = "kubermatic.k8c.io/cleanup-etcdbackupconfigs";
    pub const NODE_DELETION: &str = "kubermatic.k8c.io/delete-nodes";
    /// Deprecated: bindings are garbage collected through owner references.
    pub const CLUSTER_ROLE_BINDINGS_CLEANUP: &str =
        "kubermatic.k8c.io/cleanup-cluster-role-bindings";
    pub const CREDENTIALS_SECRETS_CLEANUP: &str = "kubermatic.k8c.io/cleanup-credentials-secrets";
}

/// Labels and annotations
pub mod labels {
    /// Clusters are only reconciled by the worker whose name matches this label
    pub const WORKER_NAME: &str = "worker-name";
    /// Set on every object rendered from an addon; used as the prune selector
    pub const ADDON: &str = "kubermatic-addon";
    /// When "true", addon resources are re-applied even after creation
    pub const ADDON_ENSURE: &str = "addons.kubermatic.io/ensure";
    pub const CLUSTER: &str = "cluster";
    pub const APP: &str = "app";
}

/// Condition types kept in Cluster and Addon status
pub mod conditions {
    pub const CLUSTER_CONTROLLER_SUCCESS: &str = "ClusterControllerReconcilingSuccess";
    pub const ADDON_CONTROLLER_SUCCESS: &str = "AddonControllerReconcilingSuccess";
    pub const CLUSTER_INITIALIZED: &str = "ClusterInitialized";
    pub const ADDON_RESOURCES_CREATED: &str = "AddonResourcesCreated";

    pub const REASON_RECONCILING_ERROR: &str = "ReconcilingError";
    /// Stored in `status.errorReason` when reconciling a cluster failed
    pub const REASON_RECONCILE_CLUSTER_ERROR: &str = "ReconcileClusterError";
}

/// Addon controller settings
pub mod addon {
    pub const CLEANUP_FINALIZER: &str = "cleanup-manifests";
    pub const MANIFEST_SEPARATOR: &str = "\n---\n";
}

/// Requeue delays used by the controllers
pub mod requeue {
    /// Concurrency limited clusters, deletion polling and unserved addon prerequisites
    pub const SHORT_SECS: u64 = 10;
    /// Transient reconcile failures
    pub const ERROR_SECS: u64 = 60;
    /// Periodic resync of healthy clusters
    pub const RESYNC_SECS: u64 = 300;
}

/// Control plane component names inside the cluster namespace
pub mod components {
    pub const APISERVER: &str = "apiserver";
    pub const CONTROLLER_MANAGER: &str = "controller-manager";
    pub const SCHEDULER: &str = "scheduler";
    pub const ETCD: &str = "etcd";
    pub const CLOUD_CONFIG: &str = "cloud-config";
    pub const ETCD_LAUNCHER: &str = "etcd-launcher";
}

/// Feature flags recognised on Cluster specs
pub mod features {
    pub const EXTERNAL_CLOUD_PROVIDER: &str = "externalCloudProvider";
    pub const ETCD_LAUNCHER: &str = "etcdLauncher";
    pub const ENCRYPTION_AT_REST: &str = "encryptionAtRest";
}

/// The operator name used as field manager and event reporter
pub const OPERATOR_NAME: &str = "seedkeeper";

/// CRD polling configuration
pub mod crd {
    pub const GROUP: &str = "kubermatic.k8c.io";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
