//! Actor and profile domain models

use super::rbac::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated identity attempting access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
    pub approved: bool,
    /// Synthesized because the local profile row had not propagated yet
    #[serde(default)]
    pub placeholder: bool,
}

impl Actor {
    /// Placeholder for a user whose profile row is missing.
    ///
    /// Always unapproved: it can reach the login/pending screen and nothing else.
    pub fn placeholder(id: Uuid, email: Option<String>, role: Role) -> Self {
        Self {
            id,
            email,
            role,
            active: true,
            approved: false,
            placeholder: true,
        }
    }

    /// Active and approved.
    pub fn is_enabled(&self) -> bool {
        self.active && self.approved
    }
}

/// Profile row in the application's user table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "ativo", alias = "active", default)]
    pub active: bool,
    #[serde(default)]
    pub approved: bool,
}

impl Profile {
    /// Build the actor, normalizing the role label. A missing role falls back
    /// to `default_role`.
    pub fn into_actor(self, default_role: &Role) -> Actor {
        let role = self
            .role
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(Role::normalize)
            .unwrap_or_else(|| default_role.clone());
        Actor {
            id: self.id,
            email: self.email,
            role,
            active: self.active,
            approved: self.approved,
            placeholder: false,
        }
    }
}

/// Input for creating a missing profile row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: String,
    #[serde(rename = "ativo")]
    pub active: bool,
    pub approved: bool,
}

impl NewProfile {
    pub fn pending(id: Uuid, email: Option<String>, role: &Role) -> Self {
        Self {
            id,
            email,
            role: role.as_str().to_string(),
            active: true,
            approved: false,
        }
    }
}
