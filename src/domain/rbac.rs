//! RBAC (Role-Based Access Control) domain models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Normalized application role.
///
/// Role labels arrive as free text from the profile store and from token
/// claims. They are normalized exactly once, when the actor is built, so the
/// rest of the engine compares enum values only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Gerente,
    /// Lowest-privilege sales role, the default for new profiles
    #[default]
    Vendedor,
    OperadorCaixa,
    Estoquista,
    Comprador,
    Aprovador,
    /// Any label outside the known set, uppercased. Never privileged.
    Other(String),
}

impl Role {
    /// Normalize a raw role label (case-insensitive, `ADMINISTRADOR` == `ADMIN`).
    pub fn normalize(label: &str) -> Self {
        let upper = label.trim().to_uppercase();
        match upper.as_str() {
            "ADMIN" | "ADMINISTRADOR" => Role::Admin,
            "GERENTE" => Role::Gerente,
            "VENDEDOR" => Role::Vendedor,
            "OPERADOR_CAIXA" => Role::OperadorCaixa,
            "ESTOQUISTA" => Role::Estoquista,
            "COMPRADOR" => Role::Comprador,
            "APROVADOR" => Role::Aprovador,
            _ => Role::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Gerente => "GERENTE",
            Role::Vendedor => "VENDEDOR",
            Role::OperadorCaixa => "OPERADOR_CAIXA",
            Role::Estoquista => "ESTOQUISTA",
            Role::Comprador => "COMPRADOR",
            Role::Aprovador => "APROVADOR",
            Role::Other(label) => label,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl From<String> for Role {
    fn from(label: String) -> Self {
        Role::normalize(&label)
    }
}

impl From<&str> for Role {
    fn from(label: &str) -> Self {
        Role::normalize(label)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an actor wants to do inside a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    #[default]
    Access,
    Create,
    Edit,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Access,
        Capability::Create,
        Capability::Edit,
        Capability::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Access => "access",
            Capability::Create => "create",
            Capability::Edit => "edit",
            Capability::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Capability::Access)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    /// Accepts the English names and the grant-table column names
    /// (`pode_acessar`, `pode_criar`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "access" | "acessar" | "pode_acessar" => Ok(Capability::Access),
            "create" | "criar" | "pode_criar" => Ok(Capability::Create),
            "edit" | "editar" | "pode_editar" => Ok(Capability::Edit),
            "delete" | "deletar" | "pode_deletar" => Ok(Capability::Delete),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}

/// Business operation on a record, checked against the role action matrix
/// rather than module grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Delete,
    Approve,
    Finalize,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Finalize => "finalize",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delete" | "excluir" => Ok(Action::Delete),
            "approve" | "aprovar" => Ok(Action::Approve),
            "finalize" | "finalizar" => Ok(Action::Finalize),
            "export" | "exportar" => Ok(Action::Export),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Per-user module grant row (dynamic permission table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleGrant {
    #[serde(rename = "usuario_id")]
    pub user_id: Uuid,
    #[serde(rename = "modulo_slug")]
    pub module_slug: String,
    #[serde(rename = "pode_acessar", default)]
    pub can_access: bool,
    #[serde(rename = "pode_criar", default)]
    pub can_create: bool,
    #[serde(rename = "pode_editar", default)]
    pub can_edit: bool,
    #[serde(rename = "pode_deletar", default)]
    pub can_delete: bool,
}

impl ModuleGrant {
    /// A grant without `pode_acessar` denies every capability.
    pub fn allows(&self, capability: Capability) -> bool {
        if !self.can_access {
            return false;
        }
        match capability {
            Capability::Access => true,
            Capability::Create => self.can_create,
            Capability::Edit => self.can_edit,
            Capability::Delete => self.can_delete,
        }
    }
}
