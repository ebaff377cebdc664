//! Admission webhook for Pod image rewriting
//!
//! Serves the mutating endpoint that redirects Pod images to the registry
//! configured on their namespace, plus a validating endpoint that admits
//! everything. Both endpoints are registered with `failurePolicy: Ignore`, and
//! the handlers themselves never deny a Pod for a policy reason.

pub mod pod;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;

use crate::namespace::NamespaceLookup;
use crate::policy::MutationPolicy;
use crate::{MUTATE_POD_PATH, VALIDATE_POD_PATH};

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Resolves the namespace of each admitted Pod
    pub lookup: Arc<dyn NamespaceLookup>,
    /// Mutation policy applied to every Pod
    pub policy: MutationPolicy,
    /// Cancelled on shutdown; in-flight namespace lookups are abandoned
    pub shutdown: CancellationToken,
}

impl WebhookState {
    /// Create webhook state with the given namespace lookup and policy
    pub fn new(lookup: Arc<dyn NamespaceLookup>, policy: MutationPolicy) -> Self {
        Self {
            lookup,
            policy,
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie in-flight requests to the given shutdown token
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// Create the webhook router
///
/// - POST `/mutate--v1-pod` - rewrite Pod images
/// - POST `/validate--v1-pod` - admit Pods unchanged
/// - GET `/healthz` - liveness check
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_POD_PATH, post(pod::mutate_handler))
        .route(VALIDATE_POD_PATH, post(pod::validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
