//! Unified error handling for the access control engine

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Access control error types
///
/// Only `Unauthenticated` is meant to reach an end user (as a redirect to
/// login). Everything else is logged and turned into a fail-closed decision by
/// the engine or the page guard.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Profile not propagated for user {0}")]
    ProfileNotPropagated(String),

    #[error("Grant store unavailable: {0}")]
    GrantStoreUnavailable(String),

    #[error("Unmapped module: {0}")]
    UnmappedModule(String),

    #[error("Capability {capability} not modeled by {source_name} permission source")]
    CapabilityMismatch {
        capability: String,
        source_name: &'static str,
    },

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::ProfileNotPropagated(_) => "profile_not_propagated",
            AppError::GrantStoreUnavailable(_) => "grant_store_unavailable",
            AppError::UnmappedModule(_) => "unmapped_module",
            AppError::CapabilityMismatch { .. } => "capability_mismatch",
            AppError::Timeout(_) => "timeout",
            AppError::Http(_) => "http",
            AppError::Jwt(_) => "jwt",
            AppError::Internal(_) => "internal",
        }
    }

    /// Whether the error comes from an unreachable or slow backing store.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            AppError::GrantStoreUnavailable(_) | AppError::Timeout(_) | AppError::Http(_)
        )
    }
}
