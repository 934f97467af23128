//! Profile repository (application user table)

use crate::domain::{NewProfile, Profile};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>>;
    async fn create(&self, input: &NewProfile) -> Result<Profile>;
}
