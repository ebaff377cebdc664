//! Stories about namespace-driven image rewriting
//!
//! Each test creates its own uniquely named namespace, so the stories can run
//! in parallel and a failed run never blocks the next one.

use tracing::Span;

use registry_rewriter::namespace::KubeNamespaceLookup;
use registry_rewriter::policy::{AdmissionContext, MutationPolicy, MutationReport};

use super::helpers::{
    create_namespace, delete_namespace, images, pod_in, test_client, unique_namespace,
};

fn ctx() -> AdmissionContext {
    AdmissionContext::new(Span::none())
}

/// Story: a team opts its namespace in and names a mirror
///
/// Expected behavior:
/// - Images without a registry host are prefixed with the mirror
/// - Images with a registry host have it replaced
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_opted_in_namespace_rewrites_images() {
    let client = test_client().await.expect("failed to setup client");
    let name = unique_namespace("rr-test-opted-in");
    let name = name.as_str();
    create_namespace(&client, name, true, Some("mirror.example.com")).await;

    let lookup = KubeNamespaceLookup::new(client.clone());
    let mut pod = pod_in(name, &["nginx", "quay.io/prometheus/node-exporter:v1.8.0"]);
    let report = MutationPolicy::default()
        .apply(&ctx(), &lookup, &mut pod)
        .await;

    assert_eq!(report.rewritten_count(), 2);
    assert_eq!(
        images(&pod),
        vec![
            Some("mirror.example.com/nginx:latest".to_string()),
            Some("mirror.example.com/prometheus/node-exporter:v1.8.0".to_string()),
        ]
    );

    delete_namespace(&client, name).await;
}

/// Story: namespaces that never opted in are left alone
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_unlabeled_namespace_is_untouched() {
    let client = test_client().await.expect("failed to setup client");
    let name = unique_namespace("rr-test-unlabeled");
    let name = name.as_str();
    create_namespace(&client, name, false, Some("mirror.example.com")).await;

    let lookup = KubeNamespaceLookup::new(client.clone());
    let mut pod = pod_in(name, &["nginx:latest"]);
    let report = MutationPolicy::default()
        .apply(&ctx(), &lookup, &mut pod)
        .await;

    assert_eq!(report, MutationReport::NotEnabled);
    assert_eq!(images(&pod), vec![Some("nginx:latest".to_string())]);

    delete_namespace(&client, name).await;
}

/// Story: opting in without naming a registry changes nothing
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_label_without_annotation_is_untouched() {
    let client = test_client().await.expect("failed to setup client");
    let name = unique_namespace("rr-test-no-annotation");
    let name = name.as_str();
    create_namespace(&client, name, true, None).await;

    let lookup = KubeNamespaceLookup::new(client.clone());
    let mut pod = pod_in(name, &["nginx:latest"]);
    let report = MutationPolicy::default()
        .apply(&ctx(), &lookup, &mut pod)
        .await;

    assert_eq!(report, MutationReport::MissingTargetRegistry);
    assert_eq!(images(&pod), vec![Some("nginx:latest".to_string())]);

    delete_namespace(&client, name).await;
}

/// Story: a Pod in a namespace the API server does not know is admitted as-is
#[tokio::test]
#[ignore = "requires a cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_namespace_is_untouched() {
    let client = test_client().await.expect("failed to setup client");

    let lookup = KubeNamespaceLookup::new(client);
    let mut pod = pod_in(&unique_namespace("rr-test-does-not-exist"), &["nginx:latest"]);
    let report = MutationPolicy::default()
        .apply(&ctx(), &lookup, &mut pod)
        .await;

    assert_eq!(report, MutationReport::NamespaceUnavailable);
    assert_eq!(images(&pod), vec![Some("nginx:latest".to_string())]);
}
