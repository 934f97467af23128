//! Identity resolution: session token -> actor

use super::with_timeout;
use crate::domain::{Actor, NewProfile, Role, Session};
use crate::error::{AppError, Result};
use crate::repository::{ProfileRepository, SessionProvider};
use std::sync::Arc;
use std::time::Duration;

pub struct IdentityResolver {
    sessions: Arc<dyn SessionProvider>,
    profiles: Arc<dyn ProfileRepository>,
    default_role: Role,
    lookup_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        profiles: Arc<dyn ProfileRepository>,
        default_role: Role,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            profiles,
            default_role,
            lookup_timeout,
        }
    }

    /// Resolve the actor behind a session token.
    ///
    /// A session without a local profile yields an unapproved placeholder
    /// actor and schedules creation of the profile in the background.
    pub async fn resolve_actor(&self, token: &str) -> Result<Actor> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Unauthenticated("missing session token".to_string()));
        }

        let session = with_timeout(self.lookup_timeout, self.sessions.get_session(token))
            .await?
            .ok_or_else(|| AppError::Unauthenticated("no valid session".to_string()))?;

        if session.is_expired() {
            return Err(AppError::Unauthenticated("session expired".to_string()));
        }

        let profile =
            with_timeout(self.lookup_timeout, self.profiles.find_by_id(session.user_id)).await?;

        match profile {
            Some(profile) => Ok(profile.into_actor(&self.default_role)),
            None => {
                let err = AppError::ProfileNotPropagated(session.user_id.to_string());
                tracing::warn!(
                    user_id = %session.user_id,
                    error = %err,
                    "Using pending placeholder actor"
                );
                self.schedule_profile_creation(&session);
                Ok(Actor::placeholder(
                    session.user_id,
                    session.email,
                    self.default_role.clone(),
                ))
            }
        }
    }

    fn schedule_profile_creation(&self, session: &Session) {
        let profiles = self.profiles.clone();
        let input = NewProfile::pending(session.user_id, session.email.clone(), &self.default_role);
        tokio::spawn(async move {
            match profiles.create(&input).await {
                Ok(_) => tracing::info!(user_id = %input.id, "Created missing profile"),
                Err(e) => tracing::warn!(
                    user_id = %input.id,
                    error = %e,
                    "Failed to create missing profile"
                ),
            }
        });
    }
}
