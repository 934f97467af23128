//! Domain models for the access control engine

pub mod access;
pub mod module;
pub mod rbac;
pub mod session;
pub mod user;

pub use access::*;
pub use module::*;
pub use rbac::*;
pub use session::*;
pub use user::*;
