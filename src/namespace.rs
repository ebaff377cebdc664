//! Namespace resolution and per-namespace rewrite settings
//!
//! Whether a Pod is rewritten is decided by its namespace: the
//! `registry-rewrite=enabled` label opts the namespace in and the
//! `image-rewriter.example.com/target-registry` annotation names the registry.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Namespace label that opts a namespace into image rewriting
pub const REGISTRY_REWRITE_LABEL: &str = "registry-rewrite";

/// Value of [`REGISTRY_REWRITE_LABEL`] that enables rewriting
pub const REGISTRY_REWRITE_ENABLED: &str = "enabled";

/// Namespace annotation naming the registry images are redirected to
pub const TARGET_REGISTRY_ANNOTATION: &str = "image-rewriter.example.com/target-registry";

/// Trait abstracting namespace retrieval
///
/// The webhook uses the Kubernetes API; tests substitute a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceLookup: Send + Sync {
    /// Get a Namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Namespace, Error>;
}

/// [`NamespaceLookup`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeNamespaceLookup {
    client: Client,
}

impl KubeNamespaceLookup {
    /// Create a lookup using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceLookup for KubeNamespaceLookup {
    async fn get_namespace(&self, name: &str) -> Result<Namespace, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(ns) => Ok(ns),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::namespace_lookup(format!(
                "namespace '{name}' not found"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Rewrite settings read from a Namespace
///
/// Recomputed for every admission request; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespacePolicy {
    /// Whether the namespace carries `registry-rewrite=enabled`
    pub enabled: bool,
    /// Non-empty target registry annotation, if present
    pub target_registry: Option<String>,
}

impl NamespacePolicy {
    /// Derive the policy from a Namespace's labels and annotations
    pub fn from_namespace(namespace: &Namespace) -> Self {
        let meta = &namespace.metadata;

        let enabled = meta
            .labels
            .as_ref()
            .and_then(|l| l.get(REGISTRY_REWRITE_LABEL))
            .is_some_and(|v| v == REGISTRY_REWRITE_ENABLED);

        let target_registry = meta
            .annotations
            .as_ref()
            .and_then(|a| a.get(TARGET_REGISTRY_ANNOTATION))
            .filter(|v| !v.is_empty())
            .cloned();

        Self {
            enabled,
            target_registry,
        }
    }
}
