//! PDV Access Core - module access control for the PDV back-office
//!
//! This crate decides which functional modules and page actions an
//! authenticated user may see or execute, combining the static role table,
//! per-user grants and the admin-only module list, and guards page
//! navigation and menu rendering on top of those decisions.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod repository;
pub mod service;
pub mod sink;
pub mod state;
pub mod supabase;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
