//! Pod admission handlers
//!
//! The mutating handler runs [`MutationPolicy`](crate::policy::MutationPolicy)
//! on a copy of the admitted Pod and answers with the JSON patch between the
//! two. Any failure along the way admits the Pod unchanged.

use std::sync::Arc;

use axum::{extract::State, Json};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use tracing::{debug, error, info, info_span};

use crate::policy::AdmissionContext;
use crate::Error;

use super::WebhookState;

/// Handle mutating admission review for Pods
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Pod> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_pod(&state, &req).await;
    Json(response.into_review())
}

/// Handle validating admission review for Pods
///
/// Image rewriting needs no validation; every Pod is admitted.
pub async fn validate_handler(
    Json(body): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<Pod> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    debug!(
        uid = %req.uid,
        operation = ?req.operation,
        pod = %req.name,
        "Validating pod"
    );
    Json(AdmissionResponse::from(&req).into_review())
}

/// Process a single pod mutation request
async fn mutate_pod(state: &WebhookState, request: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let Some(original) = &request.object else {
        debug!(uid = %request.uid, "No pod object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let span = info_span!(
        "mutate_pod",
        uid = %request.uid,
        operation = ?request.operation,
        pod = %pod_name(original, request),
        namespace = ?request.namespace,
    );
    let ctx = AdmissionContext::new(span.clone())
        .with_cancellation(state.shutdown.child_token())
        .with_request_namespace(request.namespace.clone());

    let mut pod = original.clone();
    let report = state
        .policy
        .apply(&ctx, state.lookup.as_ref(), &mut pod)
        .await;

    if report.rewritten_count() == 0 {
        return AdmissionResponse::from(request);
    }

    let patch = match build_patch(original, &pod) {
        Ok(patch) if patch.0.is_empty() => {
            debug!(parent: &span, "Images already on target registry, nothing to patch");
            return AdmissionResponse::from(request);
        }
        Ok(patch) => patch,
        Err(e) => {
            error!(parent: &span, error = %e, "Failed to diff pod, allowing unchanged");
            return AdmissionResponse::from(request);
        }
    };

    info!(parent: &span, patch_ops = patch.0.len(), "Patching pod images");

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(parent: &span, error = %e, "Failed to serialize patch, allowing unchanged");
            AdmissionResponse::from(request)
        }
    }
}

/// Build the JSON patch turning `original` into `mutated`
pub fn build_patch(original: &Pod, mutated: &Pod) -> Result<json_patch::Patch, Error> {
    let before = serde_json::to_value(original)?;
    let after = serde_json::to_value(mutated)?;
    Ok(json_patch::diff(&before, &after))
}

/// Name used to identify the Pod in logs
///
/// Pods created from a controller usually only carry `generateName` at
/// admission time.
fn pod_name(pod: &Pod, request: &AdmissionRequest<Pod>) -> String {
    pod.metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.clone())
        .unwrap_or_else(|| request.name.clone())
}
