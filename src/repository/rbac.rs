//! Grant repository (per-user module permissions)

use crate::domain::ModuleGrant;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Read-only view of the per-user grant table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GrantRepository: Send + Sync {
    async fn find_grant(&self, user_id: Uuid, module_slug: &str) -> Result<Option<ModuleGrant>>;
    async fn list_grants(&self, user_id: Uuid) -> Result<Vec<ModuleGrant>>;
}
