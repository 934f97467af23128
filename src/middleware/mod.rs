//! HTTP middleware
//!
//! - Page guard middleware for pages served behind axum

pub mod page_guard;

pub use page_guard::{bearer_token, page_guard_middleware, PageGuardState};
