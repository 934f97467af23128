//! Application wiring
//!
//! Builds the engine and its collaborators once from configuration. Every
//! component is shared through `Arc`; there is no global instance.

use crate::config::Config;
use crate::jwt::SupabaseSessionVerifier;
use crate::service::{
    build_permission_source, AccessDecisionEngine, ActionPolicy, IdentityResolver, MenuFilter,
    PageGuard,
};
use crate::sink::{AuditSink, NotificationSink, TracingAuditSink, TracingNotificationSink};
use crate::supabase::{SupabaseAuditSink, SupabaseClient};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared access-control components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<AccessDecisionEngine>,
    pub identity: Arc<IdentityResolver>,
    pub guard: Arc<PageGuard>,
    pub menu: Arc<MenuFilter>,
    pub actions: Arc<ActionPolicy>,
    /// Where the engine sends user-facing messages
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Connect to Supabase, load the module registry and assemble the engine.
    /// Engine notifications go to the log.
    pub async fn build(config: Config) -> Result<Self> {
        Self::build_with_notifier(config, Arc::new(TracingNotificationSink)).await
    }

    /// Same as [`Self::build`] with a caller-owned notification sink, e.g. a
    /// buffer scoped to one command.
    pub async fn build_with_notifier(
        config: Config,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let client =
            SupabaseClient::new(&config.supabase).context("Failed to create Supabase client")?;
        let store = Arc::new(client.clone());

        let source = build_permission_source(&config.access, store.clone());
        let audit: Arc<dyn AuditSink> = if config.access.audit_to_store {
            Arc::new(SupabaseAuditSink::new(client))
        } else {
            Arc::new(TracingAuditSink)
        };

        let engine = AccessDecisionEngine::initialize(
            &config.access,
            source,
            store.clone(),
            notifier.clone(),
        )
        .await
        .context("Failed to load module registry")?
        .with_audit_sink(audit);

        let identity = IdentityResolver::new(
            Arc::new(SupabaseSessionVerifier::from_config(&config.supabase)),
            store,
            config.access.default_role.clone(),
            config.access.lookup_timeout(),
        );

        Ok(Self::from_parts(config, engine, identity, notifier))
    }

    pub fn from_parts(
        config: Config,
        engine: AccessDecisionEngine,
        identity: IdentityResolver,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let engine = Arc::new(engine);
        let identity = Arc::new(identity);
        Self {
            config: Arc::new(config),
            guard: Arc::new(PageGuard::new(identity.clone(), engine.clone())),
            menu: Arc::new(MenuFilter::new(engine.clone())),
            actions: Arc::new(ActionPolicy::default()),
            engine,
            identity,
            notifier,
        }
    }
}
