//! Container image reference rewriting
//!
//! Redirects an image reference to a different registry host while keeping its
//! repository path and tag or digest. Registry detection is a positional
//! heuristic: the first `/`-delimited segment is treated as a registry host only
//! when it contains a `.` or a `:` (for example `docker.io` or `localhost:5000`).
//!
//! A single-label host such as `registry/app:v1` is therefore indistinguishable
//! from a repository path segment and is kept as part of the path.

use thiserror::Error;

/// Tag appended to references that carry neither a tag nor a digest
pub const DEFAULT_TAG: &str = "latest";

/// Errors returned when an image reference cannot be rewritten
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    /// The original image reference was empty
    #[error("empty image")]
    EmptyImage,

    /// The target registry was empty
    #[error("empty target registry")]
    EmptyTargetRegistry,
}

/// Rewrite `original` so that it is pulled from `target_registry`
///
/// Any existing registry host is stripped, `:latest` is appended when no tag or
/// digest is present, and the result is prefixed with `target_registry`.
///
/// ```
/// use registry_rewriter::registry::rewrite_image;
///
/// let image = rewrite_image("docker.io/library/nginx", "mirror.internal").unwrap();
/// assert_eq!(image, "mirror.internal/library/nginx:latest");
/// ```
pub fn rewrite_image(original: &str, target_registry: &str) -> Result<String, RewriteError> {
    if original.is_empty() {
        return Err(RewriteError::EmptyImage);
    }
    if target_registry.is_empty() {
        return Err(RewriteError::EmptyTargetRegistry);
    }

    let remainder = strip_registry(original);

    if has_tag_or_digest(remainder) {
        Ok(format!("{target_registry}/{remainder}"))
    } else {
        Ok(format!("{target_registry}/{remainder}:{DEFAULT_TAG}"))
    }
}

/// Drop the leading registry host, if the first segment looks like one
fn strip_registry(image: &str) -> &str {
    match image.split_once('/') {
        Some((host, rest)) if is_registry_host(host) => rest,
        _ => image,
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':')
}

fn has_tag_or_digest(image: &str) -> bool {
    image.contains(':') || image.contains('@')
}
