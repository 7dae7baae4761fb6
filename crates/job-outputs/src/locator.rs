//! File reference normalization.

use serde::{Deserialize, Serialize};

/// Service-relative prefix under which job result files are served.
pub const FILES_PREFIX: &str = "/files/";

/// A fetchable location of a result file.
///
/// Either a service-relative path (`/files/{job_id}/{filename}`) resolved
/// against the API base URL, or an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this locator is a path relative to the API base URL.
    pub fn is_service_relative(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Trailing path component.
    pub fn filename(&self) -> &str {
        trailing_component(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceLocator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a raw file reference into a locator for `job_id`.
///
/// References already under [`FILES_PREFIX`] and absolute http(s) URLs are
/// kept as they are. Anything else (a server-side path, a bare filename,
/// a Windows path) is reduced to its trailing component and rebased onto
/// `/files/{job_id}/`.
///
/// Returns `None` for empty references and references without a filename.
pub fn normalize_reference(job_id: &str, reference: &str) -> Option<ResourceLocator> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if reference.starts_with(FILES_PREFIX) || is_absolute_url(reference) {
        return Some(ResourceLocator(reference.to_string()));
    }

    let filename = trailing_component(reference);
    if filename.is_empty() {
        return None;
    }

    Some(ResourceLocator(format!("{FILES_PREFIX}{job_id}/{filename}")))
}

fn is_absolute_url(reference: &str) -> bool {
    reference.starts_with("https://") || reference.starts_with("http://")
}

fn trailing_component(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
