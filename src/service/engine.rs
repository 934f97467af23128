//! Access decision engine
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. Inactive or unapproved actor: deny
//! 2. `ADMIN`: allow
//! 3. `dashboard`: allow
//! 4. Admin-only module: deny
//! 5. Module unknown to the registry: [`AccessPolicy`]; inactive module: deny
//! 6. Capability the source does not model: deny
//! 7. Cached decision, else the permission source under a timeout.
//!    Timeouts and store failures deny and are not cached. Concurrent
//!    checks that shared the failed lookup raise a single notification.

use super::permission_source::PermissionSource;
use super::with_timeout;
use crate::cache::PermissionCache;
use crate::config::AccessConfig;
use crate::domain::{
    audit_actions, AccessPolicy, Actor, AuditEvent, Capability, Module, ModuleCatalog,
    ModuleStatus, Notification, DASHBOARD,
};
use crate::error::{AppError, Result};
use crate::repository::ModuleRegistry;
use crate::sink::{spawn_audit, AuditSink, NotificationSink};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub(crate) const SOURCE_UNAVAILABLE_MESSAGE: &str =
    "Não foi possível verificar suas permissões. Algumas funções podem estar indisponíveis.";

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ActorDisabled,
    Admin,
    Dashboard,
    AdminOnly,
    UnmappedModule,
    InactiveModule,
    CapabilityMismatch,
    UnmappedAction,
    Granted,
    NotGranted,
    SourceUnavailable,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::ActorDisabled => "actor_disabled",
            DecisionReason::Admin => "admin",
            DecisionReason::Dashboard => "dashboard",
            DecisionReason::AdminOnly => "admin_only",
            DecisionReason::UnmappedModule => "unmapped_module",
            DecisionReason::InactiveModule => "inactive_module",
            DecisionReason::CapabilityMismatch => "capability_mismatch",
            DecisionReason::UnmappedAction => "unmapped_action",
            DecisionReason::Granted => "granted",
            DecisionReason::NotGranted => "not_granted",
            DecisionReason::SourceUnavailable => "source_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Decision {
    pub(crate) fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub(crate) fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

pub struct AccessDecisionEngine {
    source: Arc<dyn PermissionSource>,
    registry: Arc<dyn ModuleRegistry>,
    catalog: RwLock<Arc<ModuleCatalog>>,
    cache: PermissionCache,
    notifier: Arc<dyn NotificationSink>,
    audit: Option<Arc<dyn AuditSink>>,
    policy: AccessPolicy,
    lookup_timeout: Duration,
    admin_only: HashSet<String>,
}

impl AccessDecisionEngine {
    /// Load the module registry once and build a ready engine.
    pub async fn initialize(
        config: &AccessConfig,
        source: Arc<dyn PermissionSource>,
        registry: Arc<dyn ModuleRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let catalog = load_catalog(registry.as_ref(), config.lookup_timeout()).await?;
        tracing::info!(
            modules = catalog.len(),
            source = source.name(),
            policy = ?config.unmapped_policy,
            "Access decision engine initialized"
        );
        Ok(Self::with_catalog(config, source, registry, notifier, catalog))
    }

    /// Build an engine around an already loaded registry snapshot.
    pub fn with_catalog(
        config: &AccessConfig,
        source: Arc<dyn PermissionSource>,
        registry: Arc<dyn ModuleRegistry>,
        notifier: Arc<dyn NotificationSink>,
        catalog: ModuleCatalog,
    ) -> Self {
        Self {
            source,
            registry,
            catalog: RwLock::new(Arc::new(catalog)),
            cache: PermissionCache::new(config.cache_ttl()),
            notifier,
            audit: None,
            policy: config.unmapped_policy,
            lookup_timeout: config.lookup_timeout(),
            admin_only: config.admin_only_modules.iter().cloned().collect(),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Current registry snapshot
    pub fn catalog(&self) -> Arc<ModuleCatalog> {
        self.catalog.read().clone()
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    pub(crate) fn audit(&self, event: AuditEvent) {
        spawn_audit(&self.audit, event);
    }

    pub fn is_admin_only(&self, module_slug: &str) -> bool {
        self.admin_only.contains(module_slug)
    }

    // ==================== Decisions ====================

    pub async fn can_access(&self, actor: &Actor, module_slug: &str, capability: Capability) -> bool {
        self.decide(actor, module_slug, capability).await.allowed
    }

    /// Decide and report which rule matched.
    pub async fn decide(&self, actor: &Actor, module_slug: &str, capability: Capability) -> Decision {
        self.evaluate(actor, module_slug, capability, true).await
    }

    /// Same as [`Self::decide`] but a source failure is only logged; the
    /// caller reports it. Used by batch checks such as a menu render.
    pub(crate) async fn decide_quietly(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Decision {
        self.evaluate(actor, module_slug, capability, false).await
    }

    async fn evaluate(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
        notify: bool,
    ) -> Decision {
        let decision = match self.evaluate_rules(actor, module_slug, capability) {
            Some(decision) => decision,
            None => self.resolve_grant(actor, module_slug, capability, notify).await,
        };

        let outcome = if decision.allowed { "allow" } else { "deny" };
        metrics::counter!(
            "pdv_access_decisions_total",
            "outcome" => outcome,
            "reason" => decision.reason.as_str()
        )
        .increment(1);
        tracing::debug!(
            actor_id = %actor.id,
            module = %module_slug,
            capability = %capability,
            allowed = decision.allowed,
            reason = decision.reason.as_str(),
            "Access decision"
        );
        decision
    }

    /// Explicit capability check from a page action. Same decision as
    /// [`Self::can_access`], recorded in the audit trail.
    pub async fn check_capability(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Decision {
        let decision = self.decide(actor, module_slug, capability).await;
        let action = if decision.allowed {
            audit_actions::CAPABILITY_GRANTED
        } else {
            audit_actions::CAPABILITY_DENIED
        };
        self.audit(AuditEvent::new(
            actor.id,
            action,
            format!("{}:{}", module_slug, capability),
        ));
        decision
    }

    /// Rules that never touch the permission source.
    fn evaluate_rules(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
    ) -> Option<Decision> {
        if !actor.is_enabled() {
            return Some(Decision::deny(DecisionReason::ActorDisabled));
        }
        if actor.role.is_admin() {
            return Some(Decision::allow(DecisionReason::Admin));
        }
        if module_slug == DASHBOARD {
            return Some(Decision::allow(DecisionReason::Dashboard));
        }
        if self.is_admin_only(module_slug) {
            return Some(Decision::deny(DecisionReason::AdminOnly));
        }

        match self.catalog.read().status(module_slug) {
            ModuleStatus::Active => {}
            ModuleStatus::Inactive => return Some(Decision::deny(DecisionReason::InactiveModule)),
            ModuleStatus::Unknown => {
                let err = AppError::UnmappedModule(module_slug.to_string());
                return Some(match self.policy {
                    AccessPolicy::FailOpen => {
                        tracing::warn!(actor_id = %actor.id, error = %err, "Allowing unmapped module");
                        Decision::allow(DecisionReason::UnmappedModule)
                    }
                    AccessPolicy::FailClosed => {
                        tracing::warn!(actor_id = %actor.id, error = %err, "Denying unmapped module");
                        Decision::deny(DecisionReason::UnmappedModule)
                    }
                });
            }
        }

        if !self.source.supports(capability) {
            let err = AppError::CapabilityMismatch {
                capability: capability.to_string(),
                source_name: self.source.name(),
            };
            tracing::warn!(actor_id = %actor.id, module = %module_slug, error = %err, "Denying capability");
            return Some(Decision::deny(DecisionReason::CapabilityMismatch));
        }

        None
    }

    async fn resolve_grant(
        &self,
        actor: &Actor,
        module_slug: &str,
        capability: Capability,
        notify: bool,
    ) -> Decision {
        // The lookup outlives this caller when coalesced, so it owns its inputs
        let source = self.source.clone();
        let owner = actor.clone();
        let slug = module_slug.to_string();
        let limit = self.lookup_timeout;
        let resolve = move || async move {
            with_timeout(limit, source.has_capability(&owner, &slug, capability)).await
        };

        match self
            .cache
            .get_or_resolve(actor.id, module_slug, capability, resolve)
            .await
        {
            Ok(true) => Decision::allow(DecisionReason::Granted),
            Ok(false) => Decision::deny(DecisionReason::NotGranted),
            Err(failure) => {
                if failure.first {
                    self.report_source_failure(actor, module_slug, &failure.error, notify);
                }
                Decision::deny(DecisionReason::SourceUnavailable)
            }
        }
    }

    fn report_source_failure(&self, actor: &Actor, module_slug: &str, err: &AppError, notify: bool) {
        metrics::counter!("pdv_access_source_errors_total", "kind" => err.kind()).increment(1);
        tracing::warn!(
            actor_id = %actor.id,
            module = %module_slug,
            source = self.source.name(),
            error = %err,
            "Permission lookup failed, denying"
        );
        if notify {
            self.notifier.notify(Notification::warning(SOURCE_UNAVAILABLE_MESSAGE));
        }
    }

    // ==================== Modules ====================

    /// Active modules the actor can open. On a source failure only the
    /// dashboard is returned.
    pub async fn accessible_modules(&self, actor: &Actor) -> Vec<Module> {
        if !actor.is_enabled() {
            return Vec::new();
        }

        let catalog = self.catalog();
        if actor.role.is_admin() {
            return catalog.active_modules().into_iter().cloned().collect();
        }

        let granted = match with_timeout(
            self.lookup_timeout,
            self.source.list_granted_module_slugs(actor),
        )
        .await
        {
            Ok(slugs) => slugs,
            Err(e) => {
                self.report_source_failure(actor, "*", &e, true);
                HashSet::new()
            }
        };

        catalog
            .active_modules()
            .into_iter()
            .filter(|m| {
                m.slug == DASHBOARD
                    || (granted.contains(&m.slug) && !self.is_admin_only(&m.slug))
            })
            .cloned()
            .collect()
    }

    /// Grant mutation signal: drop everything cached for the actor.
    pub fn invalidate_actor(&self, actor_id: Uuid) {
        self.cache.invalidate(actor_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Refresh the registry snapshot. The previous snapshot stays in place
    /// if the registry cannot be read.
    pub async fn reload_modules(&self) -> Result<usize> {
        let catalog = load_catalog(self.registry.as_ref(), self.lookup_timeout).await?;
        let count = catalog.len();
        *self.catalog.write() = Arc::new(catalog);
        tracing::info!(modules = count, "Module registry reloaded");
        Ok(count)
    }
}

async fn load_catalog(registry: &dyn ModuleRegistry, limit: Duration) -> Result<ModuleCatalog> {
    let modules = with_timeout(limit, registry.list_modules())
        .await
        .map_err(|e| {
            if e.is_store_failure() {
                e
            } else {
                AppError::GrantStoreUnavailable(e.to_string())
            }
        })?;
    Ok(ModuleCatalog::from_modules(modules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, Severity};
    use crate::repository::module::MockModuleRegistry;
    use crate::service::permission_source::MockPermissionSource;
    use crate::sink::{BufferedNotificationSink, MockAuditSink};
    use async_trait::async_trait;
    use mockall::predicate::*;
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn actor(role: Role) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            email: None,
            role,
            active: true,
            approved: true,
            placeholder: false,
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::from_modules(vec![
            Module::new("dashboard"),
            Module::new("estoque"),
            Module::new("vendas"),
            Module::new("fornecedores"),
            Module::new("usuarios"),
            Module::inactive("comandas"),
        ])
    }

    fn engine_with(
        config: &AccessConfig,
        source: impl PermissionSource + 'static,
        notifier: &BufferedNotificationSink,
    ) -> AccessDecisionEngine {
        AccessDecisionEngine::with_catalog(
            config,
            Arc::new(source),
            Arc::new(MockModuleRegistry::new()),
            Arc::new(notifier.clone()),
            catalog(),
        )
    }

    fn engine(source: impl PermissionSource + 'static) -> (AccessDecisionEngine, BufferedNotificationSink) {
        let notifier = BufferedNotificationSink::new();
        let engine = engine_with(&AccessConfig::default(), source, &notifier);
        (engine, notifier)
    }

    fn untouched_source() -> MockPermissionSource {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source.expect_has_capability().never();
        source.expect_list_granted_module_slugs().never();
        source
    }

    /// Source that counts lookups and can be made slow
    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
        granted: bool,
        down: bool,
    }

    impl CountingSource {
        fn new(granted: bool, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                granted,
                down: false,
            }
        }

        fn unreachable(delay: Duration) -> Self {
            Self {
                down: true,
                ..Self::new(false, delay)
            }
        }
    }

    #[async_trait]
    impl PermissionSource for Arc<CountingSource> {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports(&self, _capability: Capability) -> bool {
            true
        }

        async fn list_granted_module_slugs(&self, _actor: &Actor) -> Result<HashSet<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(HashSet::new())
        }

        async fn has_capability(
            &self,
            _actor: &Actor,
            _module_slug: &str,
            _capability: Capability,
        ) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.down {
                return Err(AppError::GrantStoreUnavailable("connection refused".into()));
            }
            Ok(self.granted)
        }
    }

    // ==================== Precedence ====================

    #[tokio::test]
    async fn test_admin_allows_everything_without_lookup() {
        let (engine, notifier) = engine(untouched_source());
        let admin = actor(Role::Admin);

        for slug in ["usuarios", "estoque", "comandas", "novo-modulo-nao-registrado"] {
            for capability in Capability::ALL {
                assert!(engine.can_access(&admin, slug, capability).await, "{slug}:{capability}");
            }
        }
        assert!(notifier.is_empty());
    }

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    #[case(false, false)]
    #[tokio::test]
    async fn test_disabled_actor_is_denied_everything(#[case] active: bool, #[case] approved: bool) {
        let (engine, _) = engine(untouched_source());
        let mut subject = actor(Role::Admin);
        subject.active = active;
        subject.approved = approved;

        assert!(!engine.can_access(&subject, "dashboard", Capability::Access).await);
        assert!(!engine.can_access(&subject, "vendas", Capability::Access).await);
        assert_eq!(
            engine.decide(&subject, "vendas", Capability::Access).await.reason,
            DecisionReason::ActorDisabled
        );
    }

    #[tokio::test]
    async fn test_scenario_b_inactive_vendedor_denied() {
        let (engine, _) = engine(untouched_source());
        let mut vendedor = actor(Role::Vendedor);
        vendedor.active = false;
        assert!(!engine.can_access(&vendedor, "vendas", Capability::Access).await);
    }

    #[tokio::test]
    async fn test_dashboard_allowed_with_store_down() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source
            .expect_has_capability()
            .returning(|_, _, _| Err(AppError::GrantStoreUnavailable("down".into())));
        let (engine, notifier) = engine(source);

        let estoquista = actor(Role::Estoquista);
        assert!(engine.can_access(&estoquista, "dashboard", Capability::Access).await);
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_admin_only_denied_despite_grant() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source.expect_has_capability().returning(|_, _, _| Ok(true));
        let (engine, _) = engine(source);

        let gerente = actor(Role::Gerente);
        let decision = engine.decide(&gerente, "usuarios", Capability::Access).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::AdminOnly);
    }

    #[tokio::test]
    async fn test_extra_admin_only_module_from_config() {
        let config = AccessConfig {
            admin_only_modules: vec!["fornecedores".to_string()],
            ..AccessConfig::default()
        };
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source.expect_has_capability().returning(|_, _, _| Ok(true));
        let notifier = BufferedNotificationSink::new();
        let engine = engine_with(&config, source, &notifier);

        assert!(!engine.can_access(&actor(Role::Comprador), "fornecedores", Capability::Access).await);
        assert!(engine.can_access(&actor(Role::Admin), "fornecedores", Capability::Access).await);
    }

    #[tokio::test]
    async fn test_inactive_module_denied_for_non_admin() {
        let (engine, _) = engine(untouched_source());
        let decision = engine
            .decide(&actor(Role::Vendedor), "comandas", Capability::Access)
            .await;
        assert_eq!(decision, Decision::deny(DecisionReason::InactiveModule));
    }

    #[tokio::test]
    async fn test_capability_mismatch_denied_without_lookup() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("static");
        source
            .expect_supports()
            .returning(|capability| capability == Capability::Access);
        source.expect_has_capability().never();
        let (engine, notifier) = engine(source);

        let decision = engine
            .decide(&actor(Role::Gerente), "estoque", Capability::Delete)
            .await;
        assert_eq!(decision, Decision::deny(DecisionReason::CapabilityMismatch));
        assert!(notifier.is_empty());
    }

    // ==================== Scenarios ====================

    #[tokio::test]
    async fn test_scenario_a_estoquista_grants() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source
            .expect_has_capability()
            .with(always(), eq("estoque"), always())
            .returning(|_, _, capability| {
                Ok(matches!(capability, Capability::Access | Capability::Create))
            });
        let (engine, _) = engine(source);
        let estoquista = actor(Role::Estoquista);

        assert!(engine.can_access(&estoquista, "estoque", Capability::Access).await);
        assert!(engine.can_access(&estoquista, "estoque", Capability::Create).await);
        assert!(!engine.can_access(&estoquista, "estoque", Capability::Delete).await);
        assert!(!engine.can_access(&estoquista, "usuarios", Capability::Access).await);
    }

    #[tokio::test]
    async fn test_scenario_c_store_timeout_denies_and_warns_once() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source
            .expect_has_capability()
            .times(1)
            .returning(|_, _, _| Err(AppError::Timeout(5000)));
        let (engine, notifier) = engine(source);

        let comprador = actor(Role::Comprador);
        assert!(!engine.can_access(&comprador, "fornecedores", Capability::Access).await);

        let notifications = notifier.drain();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_is_bounded_by_lookup_timeout() {
        let source = Arc::new(CountingSource::new(true, Duration::from_secs(30)));
        let (engine, notifier) = engine(source.clone());
        let comprador = actor(Role::Comprador);

        let started = tokio::time::Instant::now();
        let decision = engine.decide(&comprador, "fornecedores", Capability::Access).await;
        assert_eq!(decision, Decision::deny(DecisionReason::SourceUnavailable));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(notifier.len(), 1);

        // Nothing was cached: the next call asks the source again
        assert!(!engine.can_access(&comprador, "fornecedores", Capability::Access).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_d_unmapped_module_fail_closed_by_default() {
        let (engine, notifier) = engine(untouched_source());
        let decision = engine
            .decide(&actor(Role::Vendedor), "novo-modulo-nao-registrado", Capability::Access)
            .await;
        assert_eq!(decision, Decision::deny(DecisionReason::UnmappedModule));
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_d_unmapped_module_fail_open_when_configured() {
        let config = AccessConfig {
            unmapped_policy: AccessPolicy::FailOpen,
            ..AccessConfig::default()
        };
        let notifier = BufferedNotificationSink::new();
        let engine = engine_with(&config, untouched_source(), &notifier);

        let decision = engine
            .decide(&actor(Role::Vendedor), "novo-modulo-nao-registrado", Capability::Access)
            .await;
        assert_eq!(decision, Decision::allow(DecisionReason::UnmappedModule));
    }

    // ==================== Caching ====================

    #[tokio::test]
    async fn test_repeated_checks_hit_cache() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source.expect_has_capability().times(1).returning(|_, _, _| Ok(true));
        let (engine, _) = engine(source);
        let vendedor = actor(Role::Vendedor);

        assert!(engine.can_access(&vendedor, "vendas", Capability::Access).await);
        assert!(engine.can_access(&vendedor, "vendas", Capability::Access).await);
    }

    #[tokio::test]
    async fn test_invalidate_actor_forces_requery() {
        let answers = Mutex::new(vec![false, true]);
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source
            .expect_has_capability()
            .times(2)
            .returning(move |_, _, _| Ok(answers.lock().remove(0)));
        let (engine, _) = engine(source);
        let vendedor = actor(Role::Vendedor);

        assert!(!engine.can_access(&vendedor, "vendas", Capability::Access).await);
        assert!(!engine.can_access(&vendedor, "vendas", Capability::Access).await);

        engine.invalidate_actor(vendedor.id);
        assert!(engine.can_access(&vendedor, "vendas", Capability::Access).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_coalesce_into_one_lookup() {
        let source = Arc::new(CountingSource::new(true, Duration::from_millis(200)));
        let (engine, _) = engine(source.clone());
        let vendedor = actor(Role::Vendedor);

        let checks = (0..10).map(|_| engine.can_access(&vendedor, "vendas", Capability::Access));
        let results = futures_util::future::join_all(checks).await;

        assert!(results.into_iter().all(|allowed| allowed));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_query_once_and_warn_once() {
        let source = Arc::new(CountingSource::unreachable(Duration::from_millis(100)));
        let (engine, notifier) = engine(source.clone());
        let vendedor = actor(Role::Vendedor);

        let checks = (0..10).map(|_| engine.decide(&vendedor, "vendas", Capability::Access));
        let decisions = futures_util::future::join_all(checks).await;

        assert!(decisions
            .iter()
            .all(|d| *d == Decision::deny(DecisionReason::SourceUnavailable)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.len(), 1);

        // The failure was not kept: a later check asks again
        assert!(!engine.can_access(&vendedor, "vendas", Capability::Access).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.len(), 2);
    }

    #[tokio::test]
    async fn test_quiet_decision_logs_without_notifying() {
        let source = Arc::new(CountingSource::unreachable(Duration::ZERO));
        let (engine, notifier) = engine(source.clone());

        let decision = engine
            .decide_quietly(&actor(Role::Estoquista), "estoque", Capability::Access)
            .await;

        assert_eq!(decision, Decision::deny(DecisionReason::SourceUnavailable));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(notifier.is_empty());
    }

    #[rstest]
    #[case("admin")]
    #[case(" Administrador ")]
    #[case("ADMIN")]
    #[tokio::test]
    async fn test_role_normalization_is_equivalent(#[case] label: &str) {
        let (engine, _) = engine(untouched_source());
        let subject = actor(Role::normalize(label));
        assert!(engine.can_access(&subject, "usuarios", Capability::Delete).await);
    }

    // ==================== Audit / modules ====================

    #[tokio::test]
    async fn test_check_capability_records_audit_event() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_supports().return_const(true);
        source.expect_has_capability().returning(|_, _, _| Ok(false));

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let mut audit = MockAuditSink::new();
        audit.expect_record().times(1).returning(move |event| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(event.clone());
            }
            Ok(())
        });

        let (engine, _) = engine(source);
        let engine = engine.with_audit_sink(Arc::new(audit));
        let vendedor = actor(Role::Vendedor);

        let decision = engine.check_capability(&vendedor, "estoque", Capability::Delete).await;
        assert_eq!(decision, Decision::deny(DecisionReason::NotGranted));

        let event = rx.await.unwrap();
        assert_eq!(event.actor_id, vendedor.id);
        assert_eq!(event.action, audit_actions::CAPABILITY_DENIED);
        assert_eq!(event.resource, "estoque:delete");
    }

    #[tokio::test]
    async fn test_accessible_modules_filters_registry() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source.expect_list_granted_module_slugs().returning(|_| {
            Ok(["estoque", "comandas", "usuarios", "nao-registrado"]
                .into_iter()
                .map(String::from)
                .collect())
        });
        let (engine, _) = engine(source);

        let slugs: Vec<String> = engine
            .accessible_modules(&actor(Role::Estoquista))
            .await
            .into_iter()
            .map(|m| m.slug)
            .collect();
        pretty_assertions::assert_eq!(slugs, vec!["dashboard".to_string(), "estoque".to_string()]);
    }

    #[tokio::test]
    async fn test_accessible_modules_admin_gets_all_active() {
        let (engine, _) = engine(untouched_source());
        let modules = engine.accessible_modules(&actor(Role::Admin)).await;
        assert_eq!(modules.len(), 5);
        assert!(modules.iter().all(|m| m.active));
    }

    #[tokio::test]
    async fn test_accessible_modules_source_failure_keeps_dashboard() {
        let mut source = MockPermissionSource::new();
        source.expect_name().return_const("mock");
        source
            .expect_list_granted_module_slugs()
            .returning(|_| Err(AppError::GrantStoreUnavailable("down".into())));
        let (engine, notifier) = engine(source);

        let modules = engine.accessible_modules(&actor(Role::Vendedor)).await;
        assert_eq!(modules, vec![Module::new("dashboard")]);
        assert_eq!(notifier.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_and_reload_modules() {
        let loads = AtomicUsize::new(0);
        let mut registry = MockModuleRegistry::new();
        registry.expect_list_modules().times(2).returning(move || {
            if loads.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![Module::new("dashboard")])
            } else {
                Ok(vec![Module::new("dashboard"), Module::new("fiscal")])
            }
        });

        let engine = AccessDecisionEngine::initialize(
            &AccessConfig::default(),
            Arc::new(untouched_source()),
            Arc::new(registry),
            Arc::new(BufferedNotificationSink::new()),
        )
        .await
        .unwrap();
        assert_eq!(engine.catalog().status("fiscal"), ModuleStatus::Unknown);

        assert_eq!(engine.reload_modules().await.unwrap(), 2);
        assert_eq!(engine.catalog().status("fiscal"), ModuleStatus::Active);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_registry_unreachable() {
        let mut registry = MockModuleRegistry::new();
        registry
            .expect_list_modules()
            .returning(|| Err(AppError::Internal(anyhow::anyhow!("connection refused"))));

        let result = AccessDecisionEngine::initialize(
            &AccessConfig::default(),
            Arc::new(untouched_source()),
            Arc::new(registry),
            Arc::new(BufferedNotificationSink::new()),
        )
        .await;
        assert!(matches!(result, Err(AppError::GrantStoreUnavailable(_))));
    }
}
