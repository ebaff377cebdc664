//! Shared helpers for cluster-backed tests

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use k8s_openapi::api::core::v1::{Container, Namespace, Pod, PodSpec};
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;

use registry_rewriter::namespace::{
    REGISTRY_REWRITE_ENABLED, REGISTRY_REWRITE_LABEL, TARGET_REGISTRY_ANNOTATION,
};

/// Create a client for the current kubeconfig context
pub async fn test_client() -> Result<Client, String> {
    // Install default crypto provider (required for rustls)
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    Client::try_default()
        .await
        .map_err(|e| format!("failed to create client: {e}"))
}

/// Namespace name unique to this run
///
/// Deleting a namespace waits on finalizers, so a leftover from an earlier
/// failed run may still be terminating. A fresh name never collides with it.
pub fn unique_namespace(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{prefix}-{}-{}", std::process::id(), millis % 1_000_000)
}

/// Create a namespace with the given rewrite settings
pub async fn create_namespace(
    client: &Client,
    name: &str,
    enabled: bool,
    target_registry: Option<&str>,
) -> Namespace {
    let labels = enabled.then(|| {
        BTreeMap::from([(
            REGISTRY_REWRITE_LABEL.to_string(),
            REGISTRY_REWRITE_ENABLED.to_string(),
        )])
    });
    let annotations = target_registry
        .map(|r| BTreeMap::from([(TARGET_REGISTRY_ANNOTATION.to_string(), r.to_string())]));

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels,
            annotations,
            ..Default::default()
        },
        ..Default::default()
    };

    let api: Api<Namespace> = Api::all(client.clone());
    api.create(&PostParams::default(), &ns)
        .await
        .expect("failed to create namespace")
}

/// Delete a namespace, ignoring errors
pub async fn delete_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Build (without creating) a Pod in `namespace` with the given images
pub fn pod_in(namespace: &str, images: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("rewrite-test".to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: images
                .iter()
                .enumerate()
                .map(|(i, image)| Container {
                    name: format!("c{i}"),
                    image: Some(image.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Images of the regular containers of a Pod
pub fn images(pod: &Pod) -> Vec<Option<String>> {
    pod.spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.image.clone()).collect())
        .unwrap_or_default()
}

#[test]
fn test_unique_namespace_is_a_valid_label() {
    let name = unique_namespace("rr-test-no-annotation");
    assert!(name.starts_with("rr-test-no-annotation-"));
    assert!(name.len() <= 63);
    assert!(name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}
