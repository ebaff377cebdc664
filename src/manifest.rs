//! Webhook registration manifests
//!
//! Renders the Service and admission webhook configurations that point the API
//! server at this webhook. Both webhooks use `failurePolicy: Ignore` so an
//! unavailable webhook never blocks Pod creation.

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
    ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use serde::Serialize;

use crate::{Error, DEFAULT_WEBHOOK_PORT, MUTATE_POD_PATH, VALIDATE_POD_PATH};

/// Name of the mutating webhook entry
pub const MUTATING_WEBHOOK_NAME: &str = "mpod-v1.image-rewriter.example.com";

/// Name of the validating webhook entry
pub const VALIDATING_WEBHOOK_NAME: &str = "vpod-v1.image-rewriter.example.com";

/// Parameters for rendering webhook manifests
#[derive(Debug, Clone)]
pub struct WebhookManifestConfig {
    /// Name of the Service fronting the webhook pods
    pub service_name: String,
    /// Namespace the webhook runs in
    pub service_namespace: String,
    /// Port the webhook container listens on
    pub target_port: u16,
    /// PEM CA bundle the API server uses to verify the serving certificate
    pub ca_bundle: Option<Vec<u8>>,
}

impl Default for WebhookManifestConfig {
    fn default() -> Self {
        Self {
            service_name: "registry-rewriter-webhook".to_string(),
            service_namespace: "registry-rewriter-system".to_string(),
            target_port: DEFAULT_WEBHOOK_PORT,
            ca_bundle: None,
        }
    }
}

impl WebhookManifestConfig {
    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "app.kubernetes.io/name".to_string(),
            "registry-rewriter".to_string(),
        )])
    }

    fn client_config(&self, path: &str) -> WebhookClientConfig {
        WebhookClientConfig {
            service: Some(ServiceReference {
                name: self.service_name.clone(),
                namespace: self.service_namespace.clone(),
                path: Some(path.to_string()),
                port: Some(443),
            }),
            ca_bundle: self.ca_bundle.clone().map(k8s_openapi::ByteString),
            ..Default::default()
        }
    }

    /// ClusterIP Service exposing the webhook on port 443
    pub fn service(&self) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(self.service_name.clone()),
                namespace: Some(self.service_namespace.clone()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(self.labels()),
                ports: Some(vec![ServicePort {
                    name: Some("https".to_string()),
                    port: 443,
                    target_port: Some(IntOrString::Int(i32::from(self.target_port))),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// MutatingWebhookConfiguration routing Pod CREATE/UPDATE to the rewriter
    pub fn mutating_webhook_configuration(&self) -> MutatingWebhookConfiguration {
        MutatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some("registry-rewriter-mutating".to_string()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            webhooks: Some(vec![MutatingWebhook {
                name: MUTATING_WEBHOOK_NAME.to_string(),
                admission_review_versions: vec!["v1".to_string()],
                side_effects: "None".to_string(),
                failure_policy: Some("Ignore".to_string()),
                rules: Some(vec![pod_rule()]),
                client_config: self.client_config(MUTATE_POD_PATH),
                ..Default::default()
            }]),
        }
    }

    /// ValidatingWebhookConfiguration for the no-op Pod validator
    pub fn validating_webhook_configuration(&self) -> ValidatingWebhookConfiguration {
        ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some("registry-rewriter-validating".to_string()),
                labels: Some(self.labels()),
                ..Default::default()
            },
            webhooks: Some(vec![ValidatingWebhook {
                name: VALIDATING_WEBHOOK_NAME.to_string(),
                admission_review_versions: vec!["v1".to_string()],
                side_effects: "None".to_string(),
                failure_policy: Some("Ignore".to_string()),
                rules: Some(vec![pod_rule()]),
                client_config: self.client_config(VALIDATE_POD_PATH),
                ..Default::default()
            }]),
        }
    }

    /// Render all manifests as a multi-document YAML stream
    pub fn render_yaml(&self) -> Result<String, Error> {
        let docs = [
            to_yaml(&self.service())?,
            to_yaml(&self.mutating_webhook_configuration())?,
            to_yaml(&self.validating_webhook_configuration())?,
        ];
        Ok(docs.join("---\n"))
    }
}

fn pod_rule() -> RuleWithOperations {
    RuleWithOperations {
        operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
        api_groups: Some(vec![String::new()]),
        api_versions: Some(vec!["v1".to_string()]),
        resources: Some(vec!["pods".to_string()]),
        ..Default::default()
    }
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_yaml::to_string(value).map_err(|e| Error::serialization(e.to_string()))
}
