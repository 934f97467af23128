//! Role action matrix
//!
//! Record-level operations (delete a customer, approve a purchase order,
//! finalize a sale) are decided by role alone, independent of module grants.
//! `ADMIN` may perform everything; an action or resource missing from the
//! matrix is denied.

use super::engine::{Decision, DecisionReason};
use crate::domain::{Action, Actor, Role};
use std::collections::{HashMap, HashSet};

/// action -> resource -> roles allowed besides `ADMIN`
pub type ActionMatrix = HashMap<Action, HashMap<String, HashSet<Role>>>;

/// Which roles may perform an action on a resource
#[derive(Debug, Clone)]
pub struct ActionPolicy {
    matrix: ActionMatrix,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self::new(Self::default_matrix())
    }
}

impl ActionPolicy {
    pub fn new(matrix: ActionMatrix) -> Self {
        Self { matrix }
    }

    /// Back-office defaults. Resources listed with no roles are admin-only.
    pub fn default_matrix() -> ActionMatrix {
        let entries: [(Action, &str, &[Role]); 9] = [
            (Action::Delete, "user", &[]),
            (Action::Delete, "pedido", &[]),
            (Action::Delete, "cliente", &[Role::Gerente]),
            (Action::Delete, "produto", &[Role::Gerente]),
            (Action::Approve, "pedido", &[Role::Aprovador, Role::Gerente]),
            (Action::Approve, "venda", &[Role::Gerente]),
            (Action::Finalize, "venda", &[Role::OperadorCaixa, Role::Vendedor]),
            (Action::Finalize, "pedido", &[Role::Gerente]),
            (Action::Export, "relatorio", &[Role::Gerente]),
        ];

        let mut matrix = ActionMatrix::new();
        for (action, resource, roles) in entries {
            matrix
                .entry(action)
                .or_default()
                .insert(resource.to_string(), roles.iter().cloned().collect());
        }
        matrix
    }

    pub fn can_perform(&self, actor: &Actor, action: &str, resource: &str) -> bool {
        self.decide(actor, action, resource).allowed
    }

    /// Decide and report which rule matched.
    pub fn decide(&self, actor: &Actor, action: &str, resource: &str) -> Decision {
        let decision = self.evaluate(actor, action, resource);

        let outcome = if decision.allowed { "allow" } else { "deny" };
        metrics::counter!(
            "pdv_access_decisions_total",
            "outcome" => outcome,
            "reason" => decision.reason.as_str()
        )
        .increment(1);
        tracing::debug!(
            actor_id = %actor.id,
            action = %action,
            resource = %resource,
            allowed = decision.allowed,
            reason = decision.reason.as_str(),
            "Action decision"
        );
        decision
    }

    fn evaluate(&self, actor: &Actor, action: &str, resource: &str) -> Decision {
        if !actor.is_enabled() {
            return Decision::deny(DecisionReason::ActorDisabled);
        }
        if actor.role.is_admin() {
            return Decision::allow(DecisionReason::Admin);
        }

        let action = match action.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(actor_id = %actor.id, error = %e, "Action not mapped, denying");
                return Decision::deny(DecisionReason::UnmappedAction);
            }
        };
        let resource = resource.trim().to_lowercase();
        let roles = match self.matrix.get(&action).and_then(|r| r.get(&resource)) {
            Some(roles) => roles,
            None => {
                tracing::warn!(
                    actor_id = %actor.id,
                    action = %action,
                    resource = %resource,
                    "Resource not mapped for action, denying"
                );
                return Decision::deny(DecisionReason::UnmappedAction);
            }
        };

        if roles.contains(&actor.role) {
            Decision::allow(DecisionReason::Granted)
        } else {
            Decision::deny(DecisionReason::NotGranted)
        }
    }
}
