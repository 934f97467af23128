//! Supabase PostgREST client
//!
//! Reads profiles, grants and the module registry with the project's
//! service-role key, and implements the store traits the engine consumes.

use crate::config::SupabaseConfig;
use crate::domain::{AuditEvent, Module, ModuleGrant, NewProfile, Profile};
use crate::error::{AppError, Result};
use crate::repository::{GrantRepository, ModuleRegistry, ProfileRepository};
use crate::sink::AuditSink;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use super::types::{columns, eq, tables, AuditLogRow};

/// Supabase REST client
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http_client: Client,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            http_client,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.rest_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn check(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::GrantStoreUnavailable(format!(
            "Failed to {}: {} - {}",
            action, status, body
        )))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        action: &str,
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::GET, table)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::GrantStoreUnavailable(format!("Failed to {}: {}", action, e)))?;

        Self::check(response, action)
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::GrantStoreUnavailable(format!("Failed to parse {} response: {}", table, e))
            })
    }

    async fn insert<B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
        prefer: &str,
        action: &str,
    ) -> Result<Response> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::GrantStoreUnavailable(format!("Failed to {}: {}", action, e)))?;

        Self::check(response, action).await
    }
}

#[async_trait]
impl ProfileRepository for SupabaseClient {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select(
                tables::USERS,
                &[("select", columns::USERS.to_string()), ("id", eq(id))],
                "get profile",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, input: &NewProfile) -> Result<Profile> {
        let response = self
            .insert(
                tables::USERS,
                input,
                "resolution=ignore-duplicates,return=representation",
                "create profile",
            )
            .await?;
        let rows: Vec<Profile> = response.json().await.map_err(|e| {
            AppError::GrantStoreUnavailable(format!("Failed to parse created profile: {}", e))
        })?;

        match rows.into_iter().next() {
            Some(profile) => Ok(profile),
            // Row created concurrently by another session; return the stored one
            None => self.find_by_id(input.id).await?.ok_or_else(|| {
                AppError::GrantStoreUnavailable(format!("Profile {} was not stored", input.id))
            }),
        }
    }
}

#[async_trait]
impl GrantRepository for SupabaseClient {
    async fn find_grant(&self, user_id: Uuid, module_slug: &str) -> Result<Option<ModuleGrant>> {
        let rows: Vec<ModuleGrant> = self
            .select(
                tables::GRANTS,
                &[
                    ("select", columns::GRANTS.to_string()),
                    ("usuario_id", eq(user_id)),
                    ("modulo_slug", eq(module_slug)),
                ],
                "get grant",
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_grants(&self, user_id: Uuid) -> Result<Vec<ModuleGrant>> {
        self.select(
            tables::GRANTS,
            &[
                ("select", columns::GRANTS.to_string()),
                ("usuario_id", eq(user_id)),
            ],
            "list grants",
        )
        .await
    }
}

#[async_trait]
impl ModuleRegistry for SupabaseClient {
    async fn list_modules(&self) -> Result<Vec<Module>> {
        self.select(
            tables::MODULES,
            &[
                ("select", columns::MODULES.to_string()),
                ("order", "slug.asc".to_string()),
            ],
            "list modules",
        )
        .await
    }
}

/// Writes audit events to `auditoria_log`
#[derive(Clone)]
pub struct SupabaseAuditSink {
    client: SupabaseClient,
}

impl SupabaseAuditSink {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuditSink for SupabaseAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.client
            .insert(
                tables::AUDIT_LOG,
                &[AuditLogRow::from(event)],
                "return=minimal",
                "record audit event",
            )
            .await?;
        Ok(())
    }
}
