//! Quota detection for generation failures
//!
//! A failure counts as quota exhaustion when the service says so explicitly
//! (`ResourceExhausted`, or an HTTP 429 status), or when the error text carries
//! a 429 signal together with a quota / rate-limit marker. Everything else is
//! a non-quota failure and the unit is dropped.

use crate::{Classification, GenerateError};

/// Markers that turn a bare "429" in error text into a quota signal.
const QUOTA_MARKERS: &[&str] = &["RESOURCE_EXHAUSTED", "QUOTA", "RATE LIMIT"];

/// Classify free-form error text.
///
/// Requires both a "429" and one of the quota markers, case-insensitive.
pub fn classify_text(text: &str) -> Classification {
    let upper = text.to_uppercase();
    if upper.contains("429") && QUOTA_MARKERS.iter().any(|m| upper.contains(m)) {
        Classification::QuotaExceeded
    } else {
        Classification::NonQuota
    }
}

/// Classify an HTTP status and response body.
///
/// A 429 status is quota exhaustion on its own. Other statuses fall back to
/// the text heuristic over the body.
pub fn classify_status(status: u16, body: &str) -> Classification {
    match status {
        429 => Classification::QuotaExceeded,
        _ => classify_text(body),
    }
}

/// Default classifier used by [`crate::Generator::classify_error`].
pub fn classify(error: &GenerateError) -> Classification {
    match error {
        GenerateError::ResourceExhausted(_) => Classification::QuotaExceeded,
        GenerateError::Upstream { status, body } => classify_status(*status, body),
        GenerateError::Timeout(_) => Classification::NonQuota,
        GenerateError::Other(message) => classify_text(message),
    }
}
