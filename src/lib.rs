//! Registry Rewriter - admission webhook redirecting Pod images to a per-namespace registry
//!
//! Namespaces opt in with the `registry-rewrite=enabled` label and name their
//! registry with the `image-rewriter.example.com/target-registry` annotation.
//! Every Pod admitted into such a namespace has the images of its regular, init
//! and ephemeral containers rewritten to that registry.
//!
//! The webhook is fail-open: a namespace that cannot be read or an image that
//! cannot be rewritten leaves the Pod (or that container) unchanged, and the
//! Pod is always admitted.
//!
//! # Modules
//!
//! - [`registry`] - Image reference rewriting
//! - [`namespace`] - Namespace lookup and per-namespace settings
//! - [`policy`] - Mutation policy applied to each admitted Pod
//! - [`webhook`] - Admission webhook handlers and router
//! - [`server`] - TLS server hosting the webhook
//! - [`manifest`] - Webhook configuration manifests
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types

#![deny(missing_docs)]

use std::time::Duration;

pub mod error;
pub mod manifest;
pub mod namespace;
pub mod policy;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Path of the mutating Pod endpoint
pub const MUTATE_POD_PATH: &str = "/mutate--v1-pod";

/// Path of the validating Pod endpoint
pub const VALIDATE_POD_PATH: &str = "/validate--v1-pod";

/// Default port for the webhook HTTPS server
///
/// 9443 avoids requiring root privileges and matches the conventional
/// webhook serving port.
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default upper bound on a single namespace lookup
///
/// Kept well below the API server's default 10s webhook timeout so a slow
/// lookup still ends in an allowed response.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
