//! Access decision policy, notifications and audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// What to do with a module slug the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Allow, with a warning. Legacy behavior of the old page table.
    FailOpen,
    /// Deny, with a warning.
    FailClosed,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::FailClosed
    }
}

impl FromStr for AccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(AccessPolicy::FailOpen),
            "fail_closed" | "closed" => Ok(AccessPolicy::FailClosed),
            other => Err(format!("unknown access policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Human-readable message for the UI layer (toast/banner)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Audit action names
pub mod audit_actions {
    pub const PAGE_DENIED: &str = "page.denied";
    pub const CAPABILITY_GRANTED: &str = "capability.granted";
    pub const CAPABILITY_DENIED: &str = "capability.denied";
}

/// Audit trail record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub action: String,
    /// `module` or `module:capability`
    pub resource: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor_id: Uuid, action: &str, resource: impl Into<String>) -> Self {
        Self {
            actor_id,
            action: action.to_string(),
            resource: resource.into(),
            timestamp: Utc::now(),
        }
    }
}
