//! Route-level permission enforcement.
//!
//! ```ignore
//! Router::new().route(
//!     "/api/permissions",
//!     guard::require(&state, Requirement::permission(codes::PERMISSIONS_VIEW), get(list)),
//! )
//! ```
//!
//! Unauthenticated requests get 401, denied ones 403, and a failed lookup
//! 500. On success the resolved [`Principal`] is left in the request
//! extensions for the handler.

use std::fmt;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;

use crate::access::{Decision, Principal};
use crate::errors::DeskError;
use crate::session::BearerToken;
use crate::storage;
use crate::web::AppState;

impl<S> FromRequestParts<S> for Principal
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = DeskError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let app = AppState::from_ref(state);
        let bearer = BearerToken::from_headers(&parts.headers).ok_or(DeskError::Unauthenticated)?;

        let token = storage::get_active_access_token(&app.db, &bearer.token)
            .await?
            .ok_or(DeskError::Unauthenticated)?;

        let user = storage::get_user(&app.db, token.user_id)
            .await?
            .filter(|u| u.enabled)
            .ok_or(DeskError::Unauthenticated)?;

        let principal = Principal::new(user.id, user.role);
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}

/// What a guarded route demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// A single permission code, resolved with override precedence.
    Permission(String),
    /// Any of several codes, see [`crate::access::AccessResolver::check_any_permission`].
    AnyOf(Vec<String>),
}

impl Requirement {
    pub fn permission(code: &str) -> Self {
        Requirement::Permission(code.to_string())
    }

    pub fn any_of(codes: &[&str]) -> Self {
        Requirement::AnyOf(codes.iter().map(|c| c.to_string()).collect())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Permission(code) => write!(f, "{code}"),
            Requirement::AnyOf(codes) => write!(f, "any of [{}]", codes.join(", ")),
        }
    }
}

/// Middleware state: the application plus the requirement of one route.
#[derive(Clone)]
pub struct PermissionGuard {
    state: AppState,
    requirement: Arc<Requirement>,
}

impl PermissionGuard {
    pub fn new(state: AppState, requirement: Requirement) -> Self {
        Self {
            state,
            requirement: Arc::new(requirement),
        }
    }
}

impl FromRef<PermissionGuard> for AppState {
    fn from_ref(guard: &PermissionGuard) -> Self {
        guard.state.clone()
    }
}

/// Wrap `route` so it only runs for principals meeting `requirement`.
pub fn require(
    state: &AppState,
    requirement: Requirement,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        PermissionGuard::new(state.clone(), requirement),
        enforce,
    ))
}

async fn enforce(
    State(guard): State<PermissionGuard>,
    principal: Principal,
    request: Request,
    next: Next,
) -> Response {
    let resolver = &guard.state.resolver;
    let decision = match guard.requirement.as_ref() {
        Requirement::Permission(code) => resolver.check_permission(&principal, code).await,
        Requirement::AnyOf(codes) => resolver.check_any_permission(&principal, codes).await,
    };

    match decision {
        Ok(Decision::Allow) => {
            tracing::debug!(
                user_id = principal.user_id,
                role = %principal.role,
                requirement = %guard.requirement,
                "Permission granted"
            );
            next.run(request).await
        }
        Ok(Decision::Deny) => {
            tracing::warn!(
                user_id = principal.user_id,
                role = %principal.role,
                requirement = %guard.requirement,
                "Permission denied"
            );
            DeskError::Forbidden.into_response()
        }
        // Logged by DeskError::into_response
        Err(e) => e.into_response(),
    }
}
