//! Navigation menu filtering
//!
//! Cosmetic only: hiding an entry is not a security boundary, the page guard
//! still checks every navigation.

use super::engine::{AccessDecisionEngine, DecisionReason, SOURCE_UNAVAILABLE_MESSAGE};
use crate::domain::{Actor, Capability, Notification};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do with an entry the actor cannot open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyBehavior {
    #[default]
    Hide,
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: String,
    pub label: String,
    pub href: String,
    pub module_slug: String,
    #[serde(default)]
    pub deny_behavior: DenyBehavior,
}

impl MenuEntry {
    pub fn new(id: &str, label: &str, href: &str, module_slug: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            href: href.to_string(),
            module_slug: module_slug.to_string(),
            deny_behavior: DenyBehavior::Hide,
        }
    }

    pub fn disable_when_denied(mut self) -> Self {
        self.deny_behavior = DenyBehavior::Disable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSection {
    /// `None` for the untitled block at the top of the sidebar
    pub title: Option<String>,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLayout {
    pub sections: Vec<MenuSection>,
}

fn section(title: Option<&str>, entries: &[(&str, &str, &str, &str)]) -> MenuSection {
    MenuSection {
        title: title.map(str::to_string),
        entries: entries
            .iter()
            .map(|(id, label, href, slug)| MenuEntry::new(id, label, href, slug))
            .collect(),
    }
}

impl Default for MenuLayout {
    /// The back-office sidebar.
    fn default() -> Self {
        Self {
            sections: vec![
                section(
                    None,
                    &[("menu-dashboard", "Dashboard", "/pages/dashboard.html", "dashboard")],
                ),
                section(
                    Some("Cadastros"),
                    &[
                        ("menu-produtos", "Produtos", "/pages/produtos.html", "produtos"),
                        ("menu-fornecedores", "Fornecedores", "/pages/fornecedores.html", "fornecedores"),
                        ("menu-clientes", "Clientes", "/pages/clientes.html", "clientes"),
                        ("menu-usuarios", "Usuários", "/pages/usuarios.html", "usuarios"),
                        (
                            "menu-gerenciar-permissoes",
                            "Gerenciar Permissões",
                            "/pages/gerenciar-permissoes.html",
                            "gerenciar-permissoes",
                        ),
                        ("menu-caixas", "Caixas", "/pages/caixas.html", "caixas"),
                        (
                            "menu-aprovacao-usuarios",
                            "Aprovações de Usuários",
                            "/pages/aprovacao-usuarios.html",
                            "aprovacao-usuarios",
                        ),
                        (
                            "menu-config-empresa",
                            "Configurações da Empresa",
                            "/pages/configuracoes-empresa.html",
                            "configuracoes",
                        ),
                    ],
                ),
                section(
                    Some("Vendas"),
                    &[
                        ("menu-pdv", "PDV - Caixa", "/pages/pdv.html", "pdv"),
                        ("menu-comandas", "Comandas", "/pages/comandas.html", "comandas"),
                    ],
                ),
                section(
                    Some("Operações"),
                    &[
                        ("menu-estoque", "Estoque", "/pages/estoque.html", "estoque"),
                        (
                            "menu-controle-validade",
                            "Controle de Validade",
                            "/pages/controle-validade.html",
                            "controle-validade",
                        ),
                        ("menu-compras", "Pedidos de Compra", "/pages/pedidos.html", "pedidos-compra"),
                        ("menu-vendas", "Vendas", "/pages/vendas.html", "vendas"),
                        ("menu-vendas-pendentes", "Vendas Pendentes", "/pages/vendas-pendentes.html", "vendas"),
                        ("menu-conferencia", "Conferência de Vendas", "/pages/conferencia-vendas.html", "vendas"),
                        ("menu-aprovacao", "Aprovações", "/pages/aprovacao.html", "vendas"),
                        ("menu-pre-pedidos", "Pré-Pedidos Públicos", "/pages/pre-pedidos.html", "vendas"),
                    ],
                ),
                section(
                    Some("Financeiro"),
                    &[
                        ("menu-contas-pagar", "Contas a Pagar", "/pages/contas-pagar.html", "contas-pagar"),
                        ("menu-contas-receber", "Contas a Receber", "/pages/contas-receber.html", "contas-receber"),
                        (
                            "menu-analise-financeira",
                            "Análise Financeira",
                            "/pages/analise-financeira.html",
                            "analise-financeira",
                        ),
                    ],
                ),
                section(
                    Some("Fiscal"),
                    &[
                        (
                            "menu-documentos-fiscais",
                            "Documentos Fiscais",
                            "/pages/documentos-fiscais.html",
                            "documentos-fiscais",
                        ),
                        (
                            "menu-distribuicao-nfce",
                            "Distribuição de NFC-e",
                            "/pages/distribuicao-nfce.html",
                            "distribuicao-nfce",
                        ),
                        ("menu-teste-focus", "Testes Focus NFe", "/pages/teste-focus-nfe.html", "teste-focus-nfe"),
                        (
                            "menu-teste-nuvem",
                            "Testes Nuvem Fiscal",
                            "/pages/teste-nuvem-fiscal.html",
                            "teste-nuvem-fiscal",
                        ),
                    ],
                ),
                section(
                    Some("Sistema"),
                    &[(
                        "menu-reprocessar-estoque",
                        "Reprocessar Estoque",
                        "/pages/reprocessar-estoque.html",
                        "reprocessar-estoque",
                    )],
                ),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDisplay {
    Enabled,
    Disabled,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryView {
    pub id: String,
    pub label: String,
    pub href: String,
    pub display: EntryDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub title: Option<String>,
    pub visible: bool,
    pub entries: Vec<EntryView>,
}

/// Rendered menu state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuView {
    pub loading: bool,
    /// Some checks could not reach the permission source and were denied
    pub degraded: bool,
    pub sections: Vec<SectionView>,
}

impl MenuView {
    /// Placeholder shown until every check of a render has completed.
    pub fn loading() -> Self {
        Self {
            loading: true,
            degraded: false,
            sections: Vec::new(),
        }
    }

    pub fn visible_sections(&self) -> impl Iterator<Item = &SectionView> {
        self.sections.iter().filter(|s| s.visible)
    }

    pub fn display_of(&self, entry_id: &str) -> Option<EntryDisplay> {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .find(|e| e.id == entry_id)
            .map(|e| e.display)
    }
}

pub struct MenuFilter {
    engine: Arc<AccessDecisionEngine>,
}

impl MenuFilter {
    pub fn new(engine: Arc<AccessDecisionEngine>) -> Self {
        Self { engine }
    }

    /// Resolve every entry of the layout at once. Returns only after the
    /// whole batch is decided; entries sharing a module share one lookup.
    /// A render with failed lookups raises one warning, however many entries
    /// were affected.
    pub async fn filter(&self, actor: &Actor, layout: &MenuLayout) -> MenuView {
        let checks = layout.sections.iter().flat_map(|s| s.entries.iter()).map(|entry| {
            self.engine
                .decide_quietly(actor, &entry.module_slug, Capability::Access)
        });
        let decisions = join_all(checks).await;

        let degraded = decisions
            .iter()
            .any(|d| d.reason == DecisionReason::SourceUnavailable);
        if degraded {
            self.engine
                .notify(Notification::warning(SOURCE_UNAVAILABLE_MESSAGE));
        }
        let mut decisions = decisions.into_iter().map(|d| d.allowed);

        let sections = layout
            .sections
            .iter()
            .map(|section| {
                let entries: Vec<EntryView> = section
                    .entries
                    .iter()
                    .map(|entry| {
                        let allowed = decisions.next().unwrap_or(false);
                        let display = match (allowed, entry.deny_behavior) {
                            (true, _) => EntryDisplay::Enabled,
                            (false, DenyBehavior::Disable) => EntryDisplay::Disabled,
                            (false, DenyBehavior::Hide) => EntryDisplay::Hidden,
                        };
                        EntryView {
                            id: entry.id.clone(),
                            label: entry.label.clone(),
                            href: entry.href.clone(),
                            display,
                        }
                    })
                    .collect();
                let visible = entries.iter().any(|e| e.display != EntryDisplay::Hidden);
                SectionView {
                    title: section.title.clone(),
                    visible,
                    entries,
                }
            })
            .collect();

        tracing::debug!(actor_id = %actor.id, role = %actor.role, degraded, "Menu filtered");
        MenuView {
            loading: false,
            degraded,
            sections,
        }
    }
}
