//! Pod image mutation policy
//!
//! Decides whether a Pod's images are redirected and applies the rewrite to
//! every container collection. The policy is fail-open: it reports what it did
//! through [`MutationReport`] but never returns an error, so a namespace lookup
//! failure or a malformed image can never block Pod admission.
//!
//! Evaluation is a linear gate sequence, each gate terminal on failure:
//!
//! 1. namespace resolved (bounded by timeout and cancellation)
//! 2. `registry-rewrite=enabled` label present
//! 3. target registry annotation present and non-empty
//! 4. every container in regular, init and ephemeral collections rewritten
//!    independently

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Pod};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Span};

use crate::namespace::{NamespaceLookup, NamespacePolicy};
use crate::registry::rewrite_image;
use crate::{Error, DEFAULT_LOOKUP_TIMEOUT};

/// Per-request context threaded through a policy call
///
/// Carries the logging span for the admission request and the caller's
/// cancellation signal. Nothing in here outlives the request.
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    /// Span all policy events are attached to
    pub span: Span,
    /// Cancelled when the caller abandons the request
    pub cancel: CancellationToken,
    /// Namespace from the admission request, used when the Pod omits it
    pub request_namespace: Option<String>,
}

impl AdmissionContext {
    /// Create a context logging under `span`, with a fresh cancellation token
    pub fn new(span: Span) -> Self {
        Self {
            span,
            cancel: CancellationToken::new(),
            request_namespace: None,
        }
    }

    /// Use the caller's cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fall back to this namespace when the Pod metadata has none
    pub fn with_request_namespace(mut self, namespace: Option<String>) -> Self {
        self.request_namespace = namespace;
        self
    }
}

/// Which container collection of a Pod a container belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `spec.containers`
    Regular,
    /// `spec.initContainers`
    Init,
    /// `spec.ephemeralContainers`
    Ephemeral,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Regular => "container",
            Self::Init => "init container",
            Self::Ephemeral => "ephemeral container",
        };
        f.write_str(s)
    }
}

/// Result of processing a single container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The image field was replaced
    Rewritten {
        /// Image before the rewrite
        from: String,
        /// Image after the rewrite
        to: String,
    },
    /// The image was left untouched
    Skipped {
        /// Why the container was skipped
        reason: String,
    },
}

/// Outcome for one container, with its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerResult {
    /// Collection the container belongs to
    pub kind: ContainerKind,
    /// Container name
    pub name: String,
    /// What happened to its image
    pub outcome: MutationOutcome,
}

/// Pod-level result of a policy call
///
/// Every variant means "admit the Pod"; none of them is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationReport {
    /// The namespace could not be resolved; nothing was changed
    NamespaceUnavailable,
    /// The namespace has not opted in; nothing was changed
    NotEnabled,
    /// The namespace opted in without naming a target registry
    MissingTargetRegistry,
    /// Containers were processed against `target_registry`
    Applied {
        /// Registry images were redirected to
        target_registry: String,
        /// Per-container outcomes, in processing order
        containers: Vec<ContainerResult>,
    },
}

impl MutationReport {
    /// Number of containers whose image was replaced
    pub fn rewritten_count(&self) -> usize {
        self.containers()
            .iter()
            .filter(|c| matches!(c.outcome, MutationOutcome::Rewritten { .. }))
            .count()
    }

    /// Number of containers left untouched because their image was invalid
    pub fn skipped_count(&self) -> usize {
        self.containers()
            .iter()
            .filter(|c| matches!(c.outcome, MutationOutcome::Skipped { .. }))
            .count()
    }

    /// Per-container outcomes; empty unless the policy was applied
    pub fn containers(&self) -> &[ContainerResult] {
        match self {
            Self::Applied { containers, .. } => containers,
            _ => &[],
        }
    }
}

/// Decides and applies image rewrites for admitted Pods
#[derive(Debug, Clone)]
pub struct MutationPolicy {
    lookup_timeout: Duration,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT)
    }
}

impl MutationPolicy {
    /// Create a policy that gives up on namespace lookups after `lookup_timeout`
    pub fn new(lookup_timeout: Duration) -> Self {
        Self { lookup_timeout }
    }

    /// Rewrite the images of `pod` in place according to its namespace
    ///
    /// Always returns; failures are logged under `ctx.span` and reflected in
    /// the report.
    pub async fn apply<L>(
        &self,
        ctx: &AdmissionContext,
        lookup: &L,
        pod: &mut Pod,
    ) -> MutationReport
    where
        L: NamespaceLookup + ?Sized,
    {
        let span = &ctx.span;

        let Some(namespace_name) = pod
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| ctx.request_namespace.clone())
        else {
            warn!(parent: span, "pod has no namespace, admitting unchanged");
            return MutationReport::NamespaceUnavailable;
        };

        let namespace = match self.resolve_namespace(ctx, lookup, &namespace_name).await {
            Ok(ns) => ns,
            Err(e) => {
                error!(
                    parent: span,
                    namespace = %namespace_name,
                    error = %e,
                    "failed to get namespace, admitting pod unchanged"
                );
                return MutationReport::NamespaceUnavailable;
            }
        };

        let settings = NamespacePolicy::from_namespace(&namespace);
        if !settings.enabled {
            debug!(parent: span, namespace = %namespace_name, "registry rewrite not enabled");
            return MutationReport::NotEnabled;
        }

        let Some(target_registry) = settings.target_registry else {
            info!(
                parent: span,
                namespace = %namespace_name,
                "skipping pod - missing target registry annotation"
            );
            return MutationReport::MissingTargetRegistry;
        };

        let mut containers = Vec::new();
        if let Some(spec) = pod.spec.as_mut() {
            rewrite_collection(
                span,
                &target_registry,
                ContainerKind::Regular,
                spec.containers
                    .iter_mut()
                    .map(|c| (c.name.clone(), &mut c.image)),
                &mut containers,
            );
            rewrite_collection(
                span,
                &target_registry,
                ContainerKind::Init,
                spec.init_containers
                    .iter_mut()
                    .flatten()
                    .map(|c| (c.name.clone(), &mut c.image)),
                &mut containers,
            );
            rewrite_collection(
                span,
                &target_registry,
                ContainerKind::Ephemeral,
                spec.ephemeral_containers
                    .iter_mut()
                    .flatten()
                    .map(|c| (c.name.clone(), &mut c.image)),
                &mut containers,
            );
        }

        let report = MutationReport::Applied {
            target_registry,
            containers,
        };
        info!(
            parent: span,
            namespace = %namespace_name,
            rewritten = report.rewritten_count(),
            skipped = report.skipped_count(),
            "applied registry rewrite"
        );
        report
    }

    async fn resolve_namespace<L>(
        &self,
        ctx: &AdmissionContext,
        lookup: &L,
        name: &str,
    ) -> Result<Namespace, Error>
    where
        L: NamespaceLookup + ?Sized,
    {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                Err(Error::namespace_lookup("admission request cancelled"))
            }
            res = tokio::time::timeout(self.lookup_timeout, lookup.get_namespace(name)) => {
                res.unwrap_or_else(|_| {
                    Err(Error::namespace_lookup(format!(
                        "timed out after {:?}",
                        self.lookup_timeout
                    )))
                })
            }
        }
    }
}

/// Rewrite every image in one collection; a failure only skips that container
fn rewrite_collection<'a>(
    span: &Span,
    target_registry: &str,
    kind: ContainerKind,
    entries: impl Iterator<Item = (String, &'a mut Option<String>)>,
    results: &mut Vec<ContainerResult>,
) {
    for (name, image) in entries {
        let original = image.clone().unwrap_or_default();
        let outcome = match rewrite_image(&original, target_registry) {
            Ok(rewritten) => {
                debug!(
                    parent: span,
                    container = %name,
                    kind = %kind,
                    from = %original,
                    to = %rewritten,
                    "rewrote image"
                );
                *image = Some(rewritten.clone());
                MutationOutcome::Rewritten {
                    from: original,
                    to: rewritten,
                }
            }
            Err(e) => {
                let err = Error::from(e);
                error!(
                    parent: span,
                    container = %name,
                    kind = %kind,
                    original = %original,
                    error = %err,
                    "failed to rewrite image, leaving it unchanged"
                );
                MutationOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        };
        results.push(ContainerResult {
            kind,
            name,
            outcome,
        });
    }
}
