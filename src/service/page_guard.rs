//! Whole-page navigation guard

use super::engine::AccessDecisionEngine;
use super::identity::IdentityResolver;
use crate::domain::{audit_actions, module_for_page, AccessPolicy, Actor, AuditEvent, Capability, Notification};
use crate::error::AppError;
use serde::Serialize;
use std::sync::Arc;

pub const LOGIN_PAGE: &str = "/index.html";
pub const DASHBOARD_PAGE: &str = "/pages/dashboard.html";
/// Query parameter carrying the denial text on the dashboard redirect
pub const DENIAL_QUERY_PARAM: &str = "acesso_negado";

const PENDING_APPROVAL_MESSAGE: &str =
    "Seu cadastro está aguardando aprovação de um administrador.";
const INACTIVE_MESSAGE: &str = "Sua conta está inativa. Procure um administrador.";
const SESSION_UNAVAILABLE_MESSAGE: &str =
    "Não foi possível verificar sua sessão. Faça login novamente.";

/// Why the actor is sent back to the login screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginReason {
    SessionMissing,
    PendingApproval,
    Inactive,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    Allowed { actor: Actor },
    RedirectToLogin { reason: LoginReason },
    RedirectToDashboardWithDenial { message: String },
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allowed { .. })
    }

    /// Where to send the browser, if anywhere.
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GuardOutcome::Allowed { .. } => None,
            GuardOutcome::RedirectToLogin { .. } => Some(LOGIN_PAGE),
            GuardOutcome::RedirectToDashboardWithDenial { .. } => Some(DASHBOARD_PAGE),
        }
    }

    /// Redirect location for this request. A denial carries its message so
    /// the dashboard can show it to the same user.
    pub fn redirect_location(&self) -> Option<String> {
        match self {
            GuardOutcome::RedirectToDashboardWithDenial { message } => Some(format!(
                "{}?{}={}",
                DASHBOARD_PAGE,
                DENIAL_QUERY_PARAM,
                urlencoding::encode(message)
            )),
            other => other.redirect_target().map(str::to_string),
        }
    }
}

/// Denial text shown to the actor. Names the role, never the rule.
pub fn denial_message(actor: &Actor) -> String {
    format!(
        "Você não tem permissão para acessar esta página. Seu perfil é: {}",
        actor.role
    )
}

pub struct PageGuard {
    identity: Arc<IdentityResolver>,
    engine: Arc<AccessDecisionEngine>,
}

impl PageGuard {
    pub fn new(identity: Arc<IdentityResolver>, engine: Arc<AccessDecisionEngine>) -> Self {
        Self { identity, engine }
    }

    /// Gate navigation to a module's page.
    pub async fn guard(&self, session_token: &str, module_slug: &str) -> GuardOutcome {
        self.run(session_token, Some(module_slug)).await
    }

    /// Gate navigation by page file name or path. Pages without a module
    /// mapping follow the engine's unmapped-module policy.
    pub async fn guard_page(&self, session_token: &str, page: &str) -> GuardOutcome {
        let module_slug = module_for_page(page);
        if module_slug.is_none() {
            tracing::warn!(page = %page, "Page has no module mapping");
        }
        self.run(session_token, module_slug).await
    }

    async fn run(&self, session_token: &str, module_slug: Option<&str>) -> GuardOutcome {
        let actor = match self.identity.resolve_actor(session_token).await {
            Ok(actor) => actor,
            Err(AppError::Unauthenticated(reason)) => {
                tracing::debug!(reason = %reason, "No session, redirecting to login");
                return GuardOutcome::RedirectToLogin {
                    reason: LoginReason::SessionMissing,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity lookup failed, redirecting to login");
                self.engine
                    .notify(Notification::warning(SESSION_UNAVAILABLE_MESSAGE));
                return GuardOutcome::RedirectToLogin {
                    reason: LoginReason::Unavailable,
                };
            }
        };

        if !actor.active {
            tracing::info!(actor_id = %actor.id, "Inactive actor redirected to login");
            self.engine.notify(Notification::warning(INACTIVE_MESSAGE));
            return GuardOutcome::RedirectToLogin {
                reason: LoginReason::Inactive,
            };
        }
        if !actor.approved {
            tracing::info!(
                actor_id = %actor.id,
                placeholder = actor.placeholder,
                "Actor pending approval redirected to login"
            );
            self.engine.notify(Notification::warning(PENDING_APPROVAL_MESSAGE));
            return GuardOutcome::RedirectToLogin {
                reason: LoginReason::PendingApproval,
            };
        }

        let allowed = match module_slug {
            Some(slug) => self.engine.can_access(&actor, slug, Capability::Access).await,
            None => actor.role.is_admin() || self.engine.policy() == AccessPolicy::FailOpen,
        };

        if allowed {
            return GuardOutcome::Allowed { actor };
        }

        let resource = module_slug.unwrap_or("unmapped");
        tracing::warn!(
            actor_id = %actor.id,
            role = %actor.role,
            module = %resource,
            "Page access denied"
        );
        let message = denial_message(&actor);
        self.engine.notify(Notification::error(message.clone()));
        self.engine
            .audit(AuditEvent::new(actor.id, audit_actions::PAGE_DENIED, resource));
        GuardOutcome::RedirectToDashboardWithDenial { message }
    }
}
