//! Permission sources
//!
//! A deployment picks exactly one strategy at startup. The admin-only module
//! list is not a strategy of its own: the decision engine applies it before
//! any source is consulted.

use crate::config::{AccessConfig, PermissionStrategy};
use crate::domain::{Actor, Capability, Role};
use crate::error::{AppError, Result};
use crate::repository::GrantRepository;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Origin of per-module grants for an actor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Short strategy name for logs and metrics
    fn name(&self) -> &'static str;

    /// Whether the strategy models `capability` at all. Capabilities it does
    /// not model are denied by the engine rather than approximated.
    fn supports(&self, capability: Capability) -> bool;

    async fn list_granted_module_slugs(&self, actor: &Actor) -> Result<HashSet<String>>;

    async fn has_capability(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Result<bool>;
}

/// Fixed role -> modules table. Never performs I/O and never fails.
#[derive(Debug, Clone)]
pub struct StaticRoleTable {
    table: HashMap<Role, HashSet<String>>,
    mutation_roles: HashSet<Role>,
}

impl StaticRoleTable {
    pub fn new(
        table: HashMap<Role, HashSet<String>>,
        mutation_roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Self {
            table,
            mutation_roles: mutation_roles.into_iter().collect(),
        }
    }

    /// Default deployment table, with the given roles allowed to mutate.
    pub fn with_defaults(mutation_roles: impl IntoIterator<Item = Role>) -> Self {
        Self::new(Self::default_table(), mutation_roles)
    }

    pub fn default_table() -> HashMap<Role, HashSet<String>> {
        let entries: [(Role, &[&str]); 6] = [
            (
                Role::Gerente,
                &[
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
                ],
            ),
            (
                Role::Vendedor,
                &[
                    "dashboard",
                    "pdv",
                    "produtos",
                    "estoque",
                    "vendas",
                    "caixas",
                    "clientes",
                    "controle-validade",
                    "comandas",
                ],
            ),
            (
                Role::OperadorCaixa,
                &["dashboard", "pdv", "vendas", "caixas", "clientes", "comandas"],
            ),
            (
                Role::Estoquista,
                &[
                    "dashboard",
                    "estoque",
                    "produtos",
                    "controle-validade",
                    "pedidos-compra",
                ],
            ),
            (
                Role::Comprador,
                &[
                    "dashboard",
                    "estoque",
                    "produtos",
                    "fornecedores",
                    "pedidos-compra",
                    "controle-validade",
                ],
            ),
            (
                Role::Aprovador,
                &[
                    "dashboard",
                    "pedidos-compra",
                    "contas-pagar",
                    "vendas",
                    "analise-financeira",
                ],
            ),
        ];

        entries
            .into_iter()
            .map(|(role, slugs)| (role, slugs.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn modules_for(&self, role: &Role) -> Option<&HashSet<String>> {
        self.table.get(role)
    }
}

#[async_trait]
impl PermissionSource for StaticRoleTable {
    fn name(&self) -> &'static str {
        "static"
    }

    fn supports(&self, capability: Capability) -> bool {
        !capability.is_mutation() || !self.mutation_roles.is_empty()
    }

    async fn list_granted_module_slugs(&self, actor: &Actor) -> Result<HashSet<String>> {
        // Roles outside the table get nothing.
        Ok(self.modules_for(&actor.role).cloned().unwrap_or_default())
    }

    async fn has_capability(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Result<bool> {
        let can_access = self
            .modules_for(&actor.role)
            .map(|slugs| slugs.contains(module_slug))
            .unwrap_or(false);
        if !can_access {
            return Ok(false);
        }
        Ok(!capability.is_mutation() || self.mutation_roles.contains(&actor.role))
    }
}

/// Per-user grant rows. A missing row denies.
pub struct DynamicGrantSource<G: GrantRepository + ?Sized> {
    repo: Arc<G>,
}

impl<G: GrantRepository + ?Sized> DynamicGrantSource<G> {
    pub fn new(repo: Arc<G>) -> Self {
        Self { repo }
    }
}

fn store_unavailable(actor: &Actor, err: AppError) -> AppError {
    tracing::warn!(actor_id = %actor.id, error = %err, "Grant store lookup failed");
    match err {
        AppError::GrantStoreUnavailable(_) | AppError::Timeout(_) => err,
        other => AppError::GrantStoreUnavailable(other.to_string()),
    }
}

#[async_trait]
impl<G: GrantRepository + ?Sized> PermissionSource for DynamicGrantSource<G> {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn list_granted_module_slugs(&self, actor: &Actor) -> Result<HashSet<String>> {
        let grants = self
            .repo
            .list_grants(actor.id)
            .await
            .map_err(|e| store_unavailable(actor, e))?;
        Ok(grants
            .into_iter()
            .filter(|g| g.allows(Capability::Access))
            .map(|g| g.module_slug)
            .collect())
    }

    async fn has_capability(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Result<bool> {
        let grant = self
            .repo
            .find_grant(actor.id, module_slug)
            .await
            .map_err(|e| store_unavailable(actor, e))?;
        Ok(grant.map(|g| g.allows(capability)).unwrap_or(false))
    }
}

/// Build the source selected by configuration.
pub fn build_permission_source(
    config: &AccessConfig,
    grants: Arc<dyn GrantRepository>,
) -> Arc<dyn PermissionSource> {
    match config.strategy {
        PermissionStrategy::Static => Arc::new(StaticRoleTable::with_defaults(
            config.mutation_roles.iter().cloned(),
        )),
        PermissionStrategy::Dynamic => Arc::new(DynamicGrantSource::new(grants)),
    }
}
