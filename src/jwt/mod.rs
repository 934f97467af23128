//! Supabase access token verification

use crate::config::SupabaseConfig;
use crate::domain::Session;
use crate::error::{AppError, Result};
use crate::repository::SessionProvider;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience Supabase puts on tokens of signed-in users
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Access token claims issued by Supabase Auth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (auth user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Postgres role of the token (`authenticated`), not the application role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Free-form metadata set at sign-up; may carry the application role
    #[serde(default)]
    pub user_metadata: UserMetadata,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verifies Supabase access tokens (HS256, project JWT secret)
#[derive(Clone)]
pub struct SupabaseSessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SupabaseSessionVerifier {
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        // 5s leeway instead of the 60s default
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &SupabaseConfig) -> Self {
        let issuer = format!("{}/auth/v1", config.url);
        Self::new(&config.jwt_secret, Some(&issuer))
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    fn session_from_claims(claims: AccessTokenClaims) -> Result<Session> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthenticated("token subject is not a user id".to_string()))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Unauthenticated("invalid token expiry".to_string()))?;
        Ok(Session {
            user_id,
            email: claims.email,
            expires_at,
            role_claim: claims.user_metadata.role,
        })
    }
}

#[async_trait]
impl SessionProvider for SupabaseSessionVerifier {
    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let claims = match self.verify(token) {
            Ok(claims) => claims,
            Err(AppError::Jwt(e)) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("Access token expired"),
                    kind => tracing::debug!(error = ?kind, "Rejected access token"),
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match Self::session_from_claims(claims) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::debug!(error = %e, "Access token without usable session");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";
    const ISSUER: &str = "https://loja.supabase.co/auth/v1";

    fn claims(sub: &str, exp_offset_secs: i64) -> AccessTokenClaims {
        AccessTokenClaims {
            sub: sub.to_string(),
            email: Some("gerente@loja.com".to_string()),
            aud: AUTHENTICATED_AUDIENCE.to_string(),
            iss: Some(ISSUER.to_string()),
            role: Some("authenticated".to_string()),
            user_metadata: UserMetadata {
                role: Some("GERENTE".to_string()),
            },
            exp: Utc::now().timestamp() + exp_offset_secs,
        }
    }

    fn sign(claims: &AccessTokenClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> SupabaseSessionVerifier {
        SupabaseSessionVerifier::new(SECRET, Some(ISSUER))
    }

    #[tokio::test]
    async fn test_valid_token_yields_session() {
        let user_id = Uuid::new_v4();
        let token = sign(&claims(&user_id.to_string(), 3600), SECRET);

        let session = verifier().get_session(&token).await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.email.as_deref(), Some("gerente@loja.com"));
        assert_eq!(session.role_claim.as_deref(), Some("GERENTE"));
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn test_expired_token_has_no_session() {
        let token = sign(&claims(&Uuid::new_v4().to_string(), -3600), SECRET);
        assert!(verifier().get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_secret_has_no_session() {
        let token = sign(
            &claims(&Uuid::new_v4().to_string(), 3600),
            "another-secret-another-secret-another-secret",
        );
        assert!(verifier().get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_audience_or_issuer_rejected() {
        let mut anon = claims(&Uuid::new_v4().to_string(), 3600);
        anon.aud = "anon".to_string();
        assert!(verifier().get_session(&sign(&anon, SECRET)).await.unwrap().is_none());

        let mut foreign = claims(&Uuid::new_v4().to_string(), 3600);
        foreign.iss = Some("https://outra.supabase.co/auth/v1".to_string());
        assert!(verifier().get_session(&sign(&foreign, SECRET)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_uuid_subject_has_no_session() {
        let token = sign(&claims("service-account", 3600), SECRET);
        assert!(verifier().get_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_token_has_no_session() {
        assert!(verifier().get_session("not.a.jwt").await.unwrap().is_none());
    }

    #[test]
    fn test_from_config_uses_project_issuer() {
        let config = SupabaseConfig {
            url: "https://loja.supabase.co".to_string(),
            service_key: "service".to_string(),
            jwt_secret: SECRET.to_string(),
            http_timeout_secs: 10,
        };
        let token = sign(&claims(&Uuid::new_v4().to_string(), 3600), SECRET);
        assert!(SupabaseSessionVerifier::from_config(&config).verify(&token).is_ok());
    }
}
