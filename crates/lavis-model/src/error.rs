// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Stable error categories surfaced by [`crate::ModelGateway`] for
//! user-visible messaging, independent of which provider produced them.

/// A provider-agnostic error category.  HTTP-calling providers map their
/// status codes and transport failures onto these variants; callers (e.g.
/// `UnifiedChatService`) branch on the category rather than parsing
/// provider-specific messages.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("model/provider unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unknown model error: {0}")]
    Unknown(String),
}

impl ModelError {
    /// Map an HTTP status code to a category. Used by providers and by the
    /// gateway's own retry loop to decide whether an error is retryable.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => ModelError::Auth(body),
            429 => ModelError::RateLimit(body),
            408 => ModelError::Timeout(body),
            500..=599 => ModelError::Unavailable(body),
            _ => ModelError::Unknown(body),
        }
    }

    /// Whether the gateway's retry loop should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimit(_) | ModelError::Unavailable(_) | ModelError::Timeout(_) | ModelError::Network(_)
        )
    }
}
