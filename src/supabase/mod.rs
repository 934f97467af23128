//! Supabase adapters for the store traits

mod client;
pub mod types;

pub use client::{SupabaseAuditSink, SupabaseClient};
