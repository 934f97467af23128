//! Business logic layer

pub mod actions;
pub mod engine;
pub mod identity;
pub mod menu;
pub mod page_guard;
pub mod permission_source;

pub use actions::{ActionMatrix, ActionPolicy};
pub use engine::{AccessDecisionEngine, Decision, DecisionReason};
pub use identity::IdentityResolver;
pub use menu::{EntryDisplay, MenuFilter, MenuLayout, MenuView};
pub use page_guard::{GuardOutcome, LoginReason, PageGuard};
pub use permission_source::{
    build_permission_source, DynamicGrantSource, PermissionSource, StaticRoleTable,
};

use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;

/// Run a store lookup with an upper bound, mapping expiry to `AppError::Timeout`.
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(limit.as_millis() as u64)),
    }
}
