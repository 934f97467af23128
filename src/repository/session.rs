//! Session provider (identity service boundary)

use crate::domain::Session;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Session for an access token, `None` if the token is not a valid session.
    async fn get_session(&self, token: &str) -> Result<Option<Session>>;
}
