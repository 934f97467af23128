//! Data access layer (store traits consumed by the engine)
//!
//! The engine never talks to a database directly. Each external collaborator
//! is a trait here; the Supabase adapters in [`crate::supabase`] implement them.

pub mod module;
pub mod rbac;
pub mod session;
pub mod user;

pub use module::ModuleRegistry;
pub use rbac::GrantRepository;
pub use session::SessionProvider;
pub use user::ProfileRepository;
