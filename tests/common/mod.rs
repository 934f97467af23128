//! Common test utilities: in-memory stores for the engine's traits

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use pdv_access_core::domain::{Module, ModuleGrant, NewProfile, Profile, Session};
use pdv_access_core::error::{AppError, Result};
use pdv_access_core::repository::{
    GrantRepository, ModuleRegistry, ProfileRepository, SessionProvider,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Token -> session map
#[derive(Default)]
pub struct StaticSessions {
    sessions: Mutex<HashMap<String, Session>>,
}

impl StaticSessions {
    pub fn add(&self, token: &str, user_id: Uuid, email: &str) {
        self.sessions.lock().insert(
            token.to_string(),
            Session {
                user_id,
                email: Some(email.to_string()),
                expires_at: Utc::now() + ChronoDuration::hours(1),
                role_claim: None,
            },
        );
    }

    pub fn add_expired(&self, token: &str, user_id: Uuid) {
        self.sessions.lock().insert(
            token.to_string(),
            Session {
                user_id,
                email: None,
                expires_at: Utc::now() - ChronoDuration::minutes(5),
                role_claim: None,
            },
        );
    }
}

#[async_trait]
impl SessionProvider for StaticSessions {
    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().get(token).cloned())
    }
}

/// Profile table; signals every insert
#[derive(Default)]
pub struct InMemoryProfiles {
    rows: Mutex<HashMap<Uuid, Profile>>,
    pub created: Notify,
}

impl InMemoryProfiles {
    pub fn insert(&self, id: Uuid, role: &str, active: bool, approved: bool) {
        self.rows.lock().insert(
            id,
            Profile {
                id,
                email: None,
                role: Some(role.to_string()),
                active,
                approved,
            },
        );
    }

    pub fn get(&self, id: Uuid) -> Option<Profile> {
        self.rows.lock().get(&id).cloned()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfiles {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.get(id))
    }

    async fn create(&self, input: &NewProfile) -> Result<Profile> {
        let profile = Profile {
            id: input.id,
            email: input.email.clone(),
            role: Some(input.role.clone()),
            active: input.active,
            approved: input.approved,
        };
        self.rows.lock().insert(input.id, profile.clone());
        self.created.notify_one();
        Ok(profile)
    }
}

/// `permissoes_usuario` table with query counting, latency and outage switches
#[derive(Default)]
pub struct InMemoryGrants {
    rows: Mutex<HashMap<(Uuid, String), ModuleGrant>>,
    queries: AtomicUsize,
    down: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryGrants {
    pub fn grant(&self, user_id: Uuid, slug: &str, access: bool, create: bool, edit: bool, delete: bool) {
        self.rows.lock().insert(
            (user_id, slug.to_string()),
            ModuleGrant {
                user_id,
                module_slug: slug.to_string(),
                can_access: access,
                can_create: create,
                can_edit: edit,
                can_delete: delete,
            },
        );
    }

    pub fn revoke(&self, user_id: Uuid, slug: &str) {
        self.rows.lock().remove(&(user_id, slug.to_string()));
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    async fn before_query(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(AppError::GrantStoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantRepository for InMemoryGrants {
    async fn find_grant(&self, user_id: Uuid, module_slug: &str) -> Result<Option<ModuleGrant>> {
        self.before_query().await?;
        Ok(self
            .rows
            .lock()
            .get(&(user_id, module_slug.to_string()))
            .cloned())
    }

    async fn list_grants(&self, user_id: Uuid) -> Result<Vec<ModuleGrant>> {
        self.before_query().await?;
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Fixed module registry
pub struct StaticRegistry {
    modules: Vec<Module>,
}

impl StaticRegistry {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Every module of the back-office sidebar, all active
    pub fn back_office() -> Self {
        let slugs = [
            "dashboard",
            "pdv",
            "produtos",
            "estoque",
            "vendas",
            "caixas",
            "clientes",
            "fornecedores",
            "controle-validade",
            "comandas",
            "pedidos-compra",
            "contas-pagar",
            "contas-receber",
            "analise-financeira",
            "documentos-fiscais",
            "distribuicao-nfce",
            "usuarios",
            "aprovacao-usuarios",
            "gerenciar-permissoes",
            "configuracoes",
            "reprocessar-estoque",
            "teste-focus-nfe",
            "teste-nuvem-fiscal",
        ];
        Self::new(slugs.into_iter().map(Module::new).collect())
    }
}

#[async_trait]
impl ModuleRegistry for StaticRegistry {
    async fn list_modules(&self) -> Result<Vec<Module>> {
        Ok(self.modules.clone())
    }
}

/// Stores shared by a test and the engine under test
pub struct Stores {
    pub sessions: Arc<StaticSessions>,
    pub profiles: Arc<InMemoryProfiles>,
    pub grants: Arc<InMemoryGrants>,
    pub registry: Arc<StaticRegistry>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(StaticSessions::default()),
            profiles: Arc::new(InMemoryProfiles::default()),
            grants: Arc::new(InMemoryGrants::default()),
            registry: Arc::new(StaticRegistry::back_office()),
        }
    }

    /// Register a signed-in user with a profile row; returns its id.
    pub fn user(&self, token: &str, role: &str, active: bool, approved: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.add(token, id, &format!("{}@loja.com", token));
        self.profiles.insert(id, role, active, approved);
        id
    }
}
