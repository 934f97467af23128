//! Module registry

use crate::domain::Module;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    async fn list_modules(&self) -> Result<Vec<Module>>;
}
