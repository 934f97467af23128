//! Page guard middleware
//!
//! Runs the page guard for the requested page and answers denials with a
//! `303 See Other` to the login page or the dashboard. A dashboard redirect
//! carries the denial text in its query string, so the message reaches the
//! user who was denied. Allowed requests carry the resolved [`Actor`] as a
//! request extension.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::service::page_guard::LOGIN_PAGE;
use crate::service::{GuardOutcome, LoginReason, PageGuard};

/// Response header naming why the request was redirected
pub const GUARD_OUTCOME_HEADER: &str = "x-access-guard";

/// Shared state for the page guard middleware
#[derive(Clone)]
pub struct PageGuardState {
    guard: Arc<PageGuard>,
}

impl PageGuardState {
    pub fn new(guard: Arc<PageGuard>) -> Self {
        Self { guard }
    }
}

/// Bearer token from the Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn page_guard_middleware(
    State(state): State<PageGuardState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers()).unwrap_or_default().to_string();
    let path = request.uri().path().to_string();

    match state.guard.guard_page(&token, &path).await {
        GuardOutcome::Allowed { actor } => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        outcome => redirect_response(&outcome),
    }
}

fn outcome_label(outcome: &GuardOutcome) -> &'static str {
    match outcome {
        GuardOutcome::Allowed { .. } => "allowed",
        GuardOutcome::RedirectToLogin { reason } => match reason {
            LoginReason::SessionMissing => "login:session_missing",
            LoginReason::PendingApproval => "login:pending_approval",
            LoginReason::Inactive => "login:inactive",
            LoginReason::Unavailable => "login:unavailable",
        },
        GuardOutcome::RedirectToDashboardWithDenial { .. } => "denied",
    }
}

fn redirect_response(outcome: &GuardOutcome) -> Response {
    let location = outcome
        .redirect_location()
        .unwrap_or_else(|| LOGIN_PAGE.to_string());
    let mut response = Redirect::to(&location).into_response();
    response.headers_mut().insert(
        GUARD_OUTCOME_HEADER,
        HeaderValue::from_static(outcome_label(outcome)),
    );
    response
}
