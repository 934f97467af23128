//! PostgREST row and query types

use crate::domain::AuditEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Table names in the `public` schema
pub mod tables {
    pub const USERS: &str = "users";
    pub const GRANTS: &str = "permissoes_usuario";
    pub const MODULES: &str = "modulos";
    pub const AUDIT_LOG: &str = "auditoria_log";
}

/// Column lists requested from each table
pub mod columns {
    pub const USERS: &str = "id,email,role,ativo,approved";
    pub const GRANTS: &str =
        "usuario_id,modulo_slug,pode_acessar,pode_criar,pode_editar,pode_deletar";
    pub const MODULES: &str = "slug,nome,ativo";
}

/// Row inserted into `auditoria_log`
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogRow {
    pub usuario_id: Uuid,
    pub acao: String,
    pub recurso: String,
    pub created_at: DateTime<Utc>,
}

impl From<&AuditEvent> for AuditLogRow {
    fn from(event: &AuditEvent) -> Self {
        Self {
            usuario_id: event.actor_id,
            acao: event.action.clone(),
            recurso: event.resource.clone(),
            created_at: event.timestamp,
        }
    }
}

/// PostgREST equality filter value
pub fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_row_columns() {
        let event = AuditEvent::new(Uuid::nil(), "page.denied", "usuarios");
        let value = serde_json::to_value(AuditLogRow::from(&event)).unwrap();
        assert_eq!(value["acao"], "page.denied");
        assert_eq!(value["recurso"], "usuarios");
        assert_eq!(value["usuario_id"], Uuid::nil().to_string());
    }

    #[test]
    fn test_eq_filter() {
        assert_eq!(eq("estoque"), "eq.estoque");
    }
}
