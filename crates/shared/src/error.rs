//! Shared error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to turn a channel frame into a typed value or back.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Whether the offending frame was at least valid JSON.
    ///
    /// `false` means the peer sent something that is not JSON at all; `true`
    /// means it was JSON of the wrong shape (e.g. missing `type`).
    pub fn is_shape_error(&self) -> bool {
        match self {
            ProtocolError::Decode(e) => e.is_data(),
            ProtocolError::Encode(_) => false,
        }
    }
}

/// RFC7807 Problem Details (application/problem+json)
///
/// Canonical error body for the development server's `/api/*` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://pulsehealth.app/problems/bad-request".to_string(),
            title: "Bad Request".to_string(),
            status: 400,
            detail: Some(detail.into()),
        }
    }
}
