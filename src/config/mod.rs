//! Configuration management for the access control engine

use crate::domain::{AccessPolicy, Role, DEFAULT_ADMIN_ONLY_MODULES};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project configuration
    pub supabase: SupabaseConfig,
    /// Access decision configuration
    pub access: AccessConfig,
    /// Logging/metrics configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., https://xyz.supabase.co)
    pub url: String,
    /// Service-role API key used for PostgREST calls
    pub service_key: String,
    /// Secret used to verify user access tokens (HS256)
    pub jwt_secret: String,
    /// HTTP timeout for PostgREST calls
    pub http_timeout_secs: u64,
}

/// Which permission source backs the engine in this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStrategy {
    /// Fixed role -> modules table
    Static,
    /// Per-user grant rows
    Dynamic,
}

impl FromStr for PermissionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" | "role" | "role_table" => Ok(PermissionStrategy::Static),
            "dynamic" | "user" | "per_user" => Ok(PermissionStrategy::Dynamic),
            other => Err(format!("unknown permission strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub strategy: PermissionStrategy,
    /// Decision for slugs missing from the module registry
    pub unmapped_policy: AccessPolicy,
    pub cache_ttl_secs: u64,
    /// Upper bound for a single permission/identity lookup
    pub lookup_timeout_ms: u64,
    /// Role given to placeholder actors and to profiles without a role
    pub default_role: Role,
    /// Roles allowed to create/edit/delete under the static table.
    /// Empty means the static table is access-only.
    pub mutation_roles: Vec<Role>,
    pub admin_only_modules: Vec<String>,
    /// Write audit events to the `auditoria_log` table instead of the log
    pub audit_to_store: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            strategy: PermissionStrategy::Static,
            unmapped_policy: AccessPolicy::FailClosed,
            cache_ttl_secs: 60,
            lookup_timeout_ms: 5000,
            default_role: Role::Vendedor,
            mutation_roles: vec![Role::Admin, Role::Gerente],
            admin_only_modules: DEFAULT_ADMIN_ONLY_MODULES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            audit_to_store: false,
        }
    }
}

impl AccessConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let supabase = SupabaseConfig {
            url: lookup("SUPABASE_URL")
                .context("SUPABASE_URL is required")?
                .trim_end_matches('/')
                .to_string(),
            service_key: lookup("SUPABASE_SERVICE_KEY").context("SUPABASE_SERVICE_KEY is required")?,
            jwt_secret: lookup("SUPABASE_JWT_SECRET").context("SUPABASE_JWT_SECRET is required")?,
            http_timeout_secs: lookup("SUPABASE_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Invalid SUPABASE_HTTP_TIMEOUT_SECS")?,
        };

        let defaults = AccessConfig::default();

        let strategy = match lookup("ACCESS_PERMISSION_STRATEGY") {
            Some(raw) => raw
                .parse::<PermissionStrategy>()
                .map_err(|e| anyhow!(e))?,
            None => defaults.strategy,
        };

        let unmapped_policy = match lookup("ACCESS_UNMAPPED_POLICY") {
            Some(raw) => raw.parse::<AccessPolicy>().map_err(|e| anyhow!(e))?,
            None => defaults.unmapped_policy,
        };

        let cache_ttl_secs = lookup("ACCESS_CACHE_TTL_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .context("Invalid ACCESS_CACHE_TTL_SECS")?;

        let lookup_timeout_ms: u64 = lookup("ACCESS_LOOKUP_TIMEOUT_MS")
            .unwrap_or_else(|| "5000".to_string())
            .parse()
            .context("Invalid ACCESS_LOOKUP_TIMEOUT_MS")?;
        if lookup_timeout_ms == 0 {
            return Err(anyhow!("ACCESS_LOOKUP_TIMEOUT_MS must be greater than zero"));
        }

        let default_role = lookup("ACCESS_DEFAULT_ROLE")
            .map(|r| Role::normalize(&r))
            .unwrap_or(defaults.default_role);
        if default_role.is_admin() {
            return Err(anyhow!("ACCESS_DEFAULT_ROLE must not be an admin role"));
        }

        let mutation_roles = match lookup("ACCESS_MUTATION_ROLES") {
            Some(raw) => split_list(&raw).map(Role::normalize).collect(),
            None => defaults.mutation_roles,
        };

        // Extra entries extend the built-in set, they never replace it.
        let mut admin_only_modules = defaults.admin_only_modules;
        if let Some(raw) = lookup("ACCESS_EXTRA_ADMIN_ONLY_MODULES") {
            for slug in split_list(&raw) {
                if !crate::domain::is_valid_slug(slug) {
                    return Err(anyhow!("Invalid module slug in ACCESS_EXTRA_ADMIN_ONLY_MODULES: {}", slug));
                }
                if !admin_only_modules.iter().any(|s| s == slug) {
                    admin_only_modules.push(slug.to_string());
                }
            }
        }

        let audit_to_store = match lookup("ACCESS_AUDIT_LOG") {
            Some(raw) => raw.trim().parse::<bool>().context("Invalid ACCESS_AUDIT_LOG")?,
            None => defaults.audit_to_store,
        };

        Ok(Self {
            supabase,
            access: AccessConfig {
                strategy,
                unmapped_policy,
                cache_ttl_secs,
                lookup_timeout_ms,
                default_role,
                mutation_roles,
                admin_only_modules,
                audit_to_store,
            },
            telemetry: TelemetryConfig {
                log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("SUPABASE_URL", "https://loja.supabase.co/"),
        ("SUPABASE_SERVICE_KEY", "service-key"),
        ("SUPABASE_JWT_SECRET", "jwt-secret"),
    ];

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup_from(REQUIRED)).unwrap();

        assert_eq!(config.supabase.url, "https://loja.supabase.co");
        assert_eq!(config.access.strategy, PermissionStrategy::Static);
        assert_eq!(config.access.unmapped_policy, AccessPolicy::FailClosed);
        assert_eq!(config.access.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.access.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.access.default_role, Role::Vendedor);
        assert_eq!(config.access.mutation_roles, vec![Role::Admin, Role::Gerente]);
        assert!(config.access.admin_only_modules.contains(&"usuarios".to_string()));
        assert!(!config.access.audit_to_store);
        assert_eq!(config.telemetry.log_format, "text");
    }

    #[test]
    fn test_config_missing_required() {
        let result = Config::from_lookup(lookup_from(&[("SUPABASE_URL", "http://x")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(&[
            ("ACCESS_PERMISSION_STRATEGY", "dynamic"),
            ("ACCESS_UNMAPPED_POLICY", "fail_open"),
            ("ACCESS_CACHE_TTL_SECS", "30"),
            ("ACCESS_LOOKUP_TIMEOUT_MS", "1500"),
            ("ACCESS_DEFAULT_ROLE", "comprador"),
            ("ACCESS_MUTATION_ROLES", ""),
            ("ACCESS_EXTRA_ADMIN_ONLY_MODULES", "auditoria, usuarios"),
            ("ACCESS_AUDIT_LOG", "true"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();

        assert_eq!(config.access.strategy, PermissionStrategy::Dynamic);
        assert_eq!(config.access.unmapped_policy, AccessPolicy::FailOpen);
        assert_eq!(config.access.cache_ttl_secs, 30);
        assert_eq!(config.access.lookup_timeout_ms, 1500);
        assert_eq!(config.access.default_role, Role::Comprador);
        assert!(config.access.mutation_roles.is_empty());
        let extra = config
            .access
            .admin_only_modules
            .iter()
            .filter(|s| s.as_str() == "usuarios")
            .count();
        assert_eq!(extra, 1);
        assert!(config.access.admin_only_modules.contains(&"auditoria".to_string()));
        assert!(config.access.audit_to_store);
        assert_eq!(config.telemetry.log_format, "json");
    }

    #[test]
    fn test_config_rejects_admin_default_role() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ACCESS_DEFAULT_ROLE", "Administrador"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ACCESS_PERMISSION_STRATEGY", "hybrid"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ACCESS_LOOKUP_TIMEOUT_MS", "0"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ACCESS_EXTRA_ADMIN_ONLY_MODULES", "Bad_Slug"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }
}
