//! Functional module registry models

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slug that every enabled actor may reach
pub const DASHBOARD: &str = "dashboard";

/// Modules restricted to the ADMIN role regardless of any grant
pub const DEFAULT_ADMIN_ONLY_MODULES: &[&str] = &[
    "usuarios",
    "aprovacao-usuarios",
    "gerenciar-permissoes",
    "configuracoes",
    "reprocessar-estoque",
    "teste-focus-nfe",
    "teste-nuvem-fiscal",
];

/// Page file name -> module slug
const PAGE_MODULES: &[(&str, &str)] = &[
    ("dashboard.html", "dashboard"),
    ("pdv.html", "pdv"),
    ("produtos.html", "produtos"),
    ("categorias.html", "categorias"),
    ("marcas.html", "marcas"),
    ("estoque.html", "estoque"),
    ("estoque-novo.html", "estoque"),
    ("controle-validade.html", "controle-validade"),
    ("reprocessar-estoque.html", "reprocessar-estoque"),
    ("vendas.html", "vendas"),
    ("vendas-pendentes.html", "vendas"),
    ("venda-detalhe.html", "vendas"),
    ("conferencia-vendas.html", "vendas"),
    ("pre-pedidos.html", "vendas"),
    ("comandas.html", "comandas"),
    ("pedidos.html", "pedidos-compra"),
    ("pedido-detalhe.html", "pedidos-compra"),
    ("clientes.html", "clientes"),
    ("fornecedores.html", "fornecedores"),
    ("contas-receber.html", "contas-receber"),
    ("contas-pagar.html", "contas-pagar"),
    ("caixas.html", "caixas"),
    ("analise-financeira.html", "analise-financeira"),
    ("documentos-fiscais.html", "documentos-fiscais"),
    ("distribuicao-nfce.html", "distribuicao-nfce"),
    ("usuarios.html", "usuarios"),
    ("aprovacao-usuarios.html", "aprovacao-usuarios"),
    ("gerenciar-permissoes.html", "gerenciar-permissoes"),
    ("configuracoes-empresa.html", "configuracoes"),
];

lazy_static! {
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
}

/// Check module slug format (lowercase kebab-case)
pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Module slug for a page, accepting full paths (`/pages/estoque.html`).
pub fn module_for_page(page: &str) -> Option<&'static str> {
    let file = page.rsplit('/').next().unwrap_or(page);
    let file = file.split(['?', '#']).next().unwrap_or(file);
    PAGE_MODULES
        .iter()
        .find(|(name, _)| *name == file)
        .map(|(_, slug)| *slug)
}

fn default_true() -> bool {
    true
}

/// Module registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub slug: String,
    #[serde(rename = "nome", alias = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "ativo", alias = "active", default = "default_true")]
    pub active: bool,
}

impl Module {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: None,
            active: true,
        }
    }

    pub fn inactive(slug: impl Into<String>) -> Self {
        Self {
            active: false,
            ..Self::new(slug)
        }
    }
}

/// Registry status of a slug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Active,
    Inactive,
    Unknown,
}

/// Snapshot of the module registry
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: HashMap<String, Module>,
}

impl ModuleCatalog {
    /// Build a catalog, skipping rows with malformed slugs.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Self {
        let mut by_slug = HashMap::new();
        for module in modules {
            if !is_valid_slug(&module.slug) {
                tracing::warn!(slug = %module.slug, "Skipping module with malformed slug");
                continue;
            }
            by_slug.insert(module.slug.clone(), module);
        }
        Self { modules: by_slug }
    }

    pub fn status(&self, slug: &str) -> ModuleStatus {
        match self.modules.get(slug) {
            Some(m) if m.active => ModuleStatus::Active,
            Some(_) => ModuleStatus::Inactive,
            None => ModuleStatus::Unknown,
        }
    }

    pub fn get(&self, slug: &str) -> Option<&Module> {
        self.modules.get(slug)
    }

    /// Active modules, sorted by slug.
    pub fn active_modules(&self) -> Vec<&Module> {
        let mut active: Vec<&Module> = self.modules.values().filter(|m| m.active).collect();
        active.sort_by(|a, b| a.slug.cmp(&b.slug));
        active
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
