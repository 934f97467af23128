use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pdv_access_core::domain::{Actor, Capability};
use pdv_access_core::service::MenuLayout;
use pdv_access_core::sink::BufferedNotificationSink;
use pdv_access_core::{config::Config, state::AppState, telemetry, AppError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Access control checks against the PDV Supabase project
#[derive(Parser)]
#[command(name = "pdv-access", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the page guard for a page file name or a module slug
    Guard {
        /// Supabase access token
        #[arg(long)]
        token: String,
        #[arg(long, conflicts_with = "module", required_unless_present = "module")]
        page: Option<String>,
        #[arg(long)]
        module: Option<String>,
    },
    /// Check one capability on a module (audited)
    Check {
        #[arg(long)]
        token: String,
        #[arg(long)]
        module: String,
        /// access | create | edit | delete
        #[arg(long, default_value = "access")]
        capability: Capability,
    },
    /// Check a record-level action against the role action matrix
    Perform {
        #[arg(long)]
        token: String,
        /// delete | approve | finalize | export
        #[arg(long)]
        action: String,
        /// e.g. cliente, pedido, venda, relatorio
        #[arg(long)]
        resource: String,
    },
    /// Render the filtered sidebar menu
    Menu {
        #[arg(long)]
        token: String,
    },
    /// List the modules the user can open
    Modules {
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    telemetry::init(&config.telemetry);

    info!(
        strategy = ?config.access.strategy,
        policy = ?config.access.unmapped_policy,
        "Starting pdv-access"
    );
    let notifications = BufferedNotificationSink::new();
    let state = AppState::build_with_notifier(config, Arc::new(notifications.clone())).await?;

    let output = match cli.command {
        Command::Guard {
            token,
            page,
            module,
        } => {
            let outcome = match (page, module) {
                (Some(page), _) => state.guard.guard_page(&token, &page).await,
                (None, Some(module)) => state.guard.guard(&token, &module).await,
                (None, None) => return Err(anyhow!("either --page or --module is required")),
            };
            json!({
                "outcome": outcome,
                "redirect": outcome.redirect_location(),
            })
        }
        Command::Check {
            token,
            module,
            capability,
        } => {
            let actor = resolve(&state, &token).await?;
            let decision = state
                .engine
                .check_capability(&actor, &module, capability)
                .await;
            json!({
                "actor": actor,
                "module": module,
                "capability": capability,
                "decision": decision,
            })
        }
        Command::Perform {
            token,
            action,
            resource,
        } => {
            let actor = resolve(&state, &token).await?;
            let decision = state.actions.decide(&actor, &action, &resource);
            json!({
                "actor": actor,
                "action": action,
                "resource": resource,
                "decision": decision,
            })
        }
        Command::Menu { token } => {
            let actor = resolve(&state, &token).await?;
            let view = state.menu.filter(&actor, &MenuLayout::default()).await;
            json!({ "actor": actor, "menu": view })
        }
        Command::Modules { token } => {
            let actor = resolve(&state, &token).await?;
            let modules = state.engine.accessible_modules(&actor).await;
            json!({ "actor": actor, "modules": modules })
        }
    };

    print(output, &notifications)
}

async fn resolve(state: &AppState, token: &str) -> Result<Actor> {
    match state.identity.resolve_actor(token).await {
        Ok(actor) => Ok(actor),
        Err(AppError::Unauthenticated(reason)) => {
            Err(anyhow!("not authenticated: {}", reason))
        }
        Err(e) => Err(e.into()),
    }
}

fn print(mut output: Value, notifications: &BufferedNotificationSink) -> Result<()> {
    output["notifications"] = serde_json::to_value(notifications.drain())?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
