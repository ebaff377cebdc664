//! Integration tests for the registry rewriter
//!
//! These tests run the mutation policy in-process against namespaces created
//! in a real cluster, so they exercise the Kubernetes-backed namespace lookup
//! without deploying the webhook.
//!
//! - `namespace_rewrite`: Stories about how namespace labels and annotations
//!   drive the rewrite of Pod images

mod helpers;
mod namespace_rewrite;
