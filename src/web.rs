//! HTTP surface of the access-control service.
//!
//! Every `/api` route except login is authenticated with a bearer token.
//! Routes that need more than authentication are wrapped with
//! [`guard::require`], which resolves the caller's permission before the
//! handler runs.
use crate::access::catalog::codes::*;
use crate::access::guard::{self, Requirement};
use crate::access::{AccessResolver, DbPolicyStore, Principal};
use crate::app_settings::AppSettingsCache;
use crate::entities;
use crate::errors::DeskError;
use crate::session::BearerToken;
use crate::settings::Settings;
use crate::storage::{self, GrantEntry, NewPermission, PermissionGrant, PermissionUpdate};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub resolver: AccessResolver,
    pub app_settings: AppSettingsCache,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection) -> Self {
        let resolver = AccessResolver::new(Arc::new(DbPolicyStore::new(db.clone())));
        let app_settings = AppSettingsCache::new(db.clone(), settings.cache.settings_ttl_secs);
        Self {
            settings: Arc::new(settings),
            db,
            resolver,
            app_settings,
        }
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // JSON only, nothing to load
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Responses may carry tokens and permission maps
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    let s = &state;

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route(
            "/api/permissions",
            guard::require(s, Requirement::permission(PERMISSIONS_VIEW), get(list_permissions))
                .merge(guard::require(
                    s,
                    Requirement::permission(PERMISSIONS_MANAGE),
                    post(create_permission),
                )),
        )
        .route("/api/permissions/me", get(my_permissions))
        .route("/api/permissions/check", post(check_permissions))
        .route(
            "/api/permissions/{id}",
            guard::require(
                s,
                Requirement::permission(PERMISSIONS_MANAGE),
                put(update_permission).delete(delete_permission),
            ),
        )
        .route(
            "/api/roles/{role}/permissions",
            guard::require(s, Requirement::permission(PERMISSIONS_VIEW), get(role_permissions))
                .merge(guard::require(
                    s,
                    Requirement::permission(PERMISSIONS_MANAGE),
                    put(replace_role_permissions),
                )),
        )
        .route(
            "/api/users/{id}/permissions",
            guard::require(
                s,
                Requirement::any_of(&[PERMISSIONS_VIEW, USERS_VIEW]),
                get(user_permissions),
            )
            .merge(guard::require(
                s,
                Requirement::permission(PERMISSIONS_MANAGE),
                put(replace_user_permissions),
            )),
        )
        .route(
            "/api/settings",
            guard::require(s, Requirement::permission(SETTINGS_VIEW), get(list_settings)),
        )
        .route(
            "/api/settings/{key}",
            guard::require(s, Requirement::permission(SETTINGS_VIEW), get(get_setting)).merge(
                guard::require(s, Requirement::permission(SETTINGS_UPDATE), put(put_setting)),
            ),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(settings: Settings, db: DatabaseConnection) -> miette::Result<()> {
    let state = AppState::new(settings, db);

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = router(state);

    tracing::info!(%addr, "Access control API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// Authentication

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    expires_at: i64,
    user: entities::user::Model,
    permissions: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
struct CurrentUser {
    user: entities::user::Model,
    permissions: BTreeMap<String, bool>,
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, DeskError> {
    let Some(user) = storage::verify_user_password(&state.db, &req.username, &req.password).await?
    else {
        tracing::warn!(username = %req.username, "Login failed");
        return Err(DeskError::Unauthenticated);
    };

    let token =
        storage::issue_access_token(&state.db, user.id, state.settings.auth.token_ttl_secs).await?;
    let permissions = state
        .resolver
        .effective_permissions(user.id, &user.role)
        .await?;

    tracing::info!(user_id = user.id, role = %user.role, "User logged in");
    Ok(Json(LoginResponse {
        token: token.token,
        expires_at: token.expires_at,
        user,
        permissions,
    }))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<StatusCode, DeskError> {
    if let Some(bearer) = BearerToken::from_headers(&headers) {
        storage::revoke_access_token(&state.db, &bearer.token).await?;
    }
    tracing::info!(user_id = principal.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
async fn me(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<CurrentUser>, DeskError> {
    let user = storage::get_user(&state.db, principal.user_id)
        .await?
        .ok_or(DeskError::Unauthenticated)?;
    let permissions = state
        .resolver
        .effective_permissions(principal.user_id, &principal.role)
        .await?;
    Ok(Json(CurrentUser { user, permissions }))
}

// Permission catalog

#[derive(Debug, Deserialize)]
struct PermissionQuery {
    category: Option<String>,
}

/// GET /api/permissions?category=
async fn list_permissions(
    State(state): State<AppState>,
    Query(query): Query<PermissionQuery>,
) -> Result<Json<Vec<entities::permission::Model>>, DeskError> {
    let permissions = storage::list_permissions(&state.db, query.category.as_deref()).await?;
    Ok(Json(permissions))
}

/// POST /api/permissions
async fn create_permission(
    State(state): State<AppState>,
    principal: Principal,
    Json(input): Json<NewPermission>,
) -> Result<(StatusCode, Json<entities::permission::Model>), DeskError> {
    let permission = storage::create_permission(&state.db, input).await?;
    tracing::info!(
        user_id = principal.user_id,
        code = %permission.code,
        "Permission created"
    );
    Ok((StatusCode::CREATED, Json(permission)))
}

/// PUT /api/permissions/{id}
async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<PermissionUpdate>,
) -> Result<Json<entities::permission::Model>, DeskError> {
    let permission = storage::update_permission(&state.db, id, update).await?;
    Ok(Json(permission))
}

/// DELETE /api/permissions/{id}
async fn delete_permission(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, DeskError> {
    storage::delete_permission(&state.db, id).await?;
    tracing::info!(user_id = principal.user_id, permission_id = id, "Permission deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/permissions/me
async fn my_permissions(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Value>, DeskError> {
    let permissions = state
        .resolver
        .effective_permissions(principal.user_id, &principal.role)
        .await?;
    Ok(Json(json!({
        "role": principal.role,
        "permissions": permissions,
    })))
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    codes: Vec<String>,
    /// Any-of semantics instead of all-of
    #[serde(default)]
    any: bool,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    allowed: bool,
    results: BTreeMap<String, bool>,
}

/// POST /api/permissions/check
///
/// Evaluates `codes` for the caller. `results` holds the per-code decision;
/// `allowed` is the any-of decision when `any` is set and otherwise requires
/// every code (an empty list is never allowed).
async fn check_permissions(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, DeskError> {
    let mut results = BTreeMap::new();
    for code in &req.codes {
        let decision = state.resolver.check_permission(&principal, code).await?;
        results.insert(code.clone(), decision.is_allowed());
    }

    let allowed = if req.any {
        state
            .resolver
            .check_any_permission(&principal, &req.codes)
            .await?
            .is_allowed()
    } else {
        !req.codes.is_empty() && results.values().all(|granted| *granted)
    };

    Ok(Json(CheckResponse { allowed, results }))
}

// Role defaults and user overrides

fn known_role(state: &AppState, role: &str) -> Result<(), DeskError> {
    if state.settings.is_known_role(role) {
        Ok(())
    } else {
        Err(DeskError::NotFound(format!("role `{role}`")))
    }
}

/// GET /api/roles/{role}/permissions
async fn role_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<Vec<PermissionGrant>>, DeskError> {
    known_role(&state, &role)?;
    Ok(Json(storage::get_role_permissions(&state.db, &role).await?))
}

/// PUT /api/roles/{role}/permissions
async fn replace_role_permissions(
    State(state): State<AppState>,
    principal: Principal,
    Path(role): Path<String>,
    Json(entries): Json<Vec<GrantEntry>>,
) -> Result<Json<Vec<PermissionGrant>>, DeskError> {
    known_role(&state, &role)?;
    storage::set_role_permissions(&state.db, &role, &entries).await?;
    tracing::info!(
        user_id = principal.user_id,
        role = %role,
        entries = entries.len(),
        "Role permissions replaced via API"
    );
    Ok(Json(storage::get_role_permissions(&state.db, &role).await?))
}

/// GET /api/users/{id}/permissions
async fn user_permissions(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> Result<Json<Vec<PermissionGrant>>, DeskError> {
    if storage::get_user(&state.db, user_id).await?.is_none() {
        return Err(DeskError::NotFound(format!("user {user_id}")));
    }
    Ok(Json(storage::get_user_permissions(&state.db, user_id).await?))
}

/// PUT /api/users/{id}/permissions
async fn replace_user_permissions(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<i32>,
    Json(entries): Json<Vec<GrantEntry>>,
) -> Result<Json<Vec<PermissionGrant>>, DeskError> {
    storage::set_user_permissions(&state.db, user_id, &entries).await?;
    tracing::info!(
        user_id = principal.user_id,
        target_user_id = user_id,
        entries = entries.len(),
        "User permission overrides replaced via API"
    );
    Ok(Json(storage::get_user_permissions(&state.db, user_id).await?))
}

// Application settings

/// GET /api/settings
async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, Value>>, DeskError> {
    let values = state.app_settings.all().await?;
    Ok(Json(values.as_ref().clone()))
}

/// GET /api/settings/{key}
async fn get_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, DeskError> {
    let value = state.app_settings.get(&key, Value::Null).await?;
    if value.is_null() {
        return Err(DeskError::NotFound(format!("setting `{key}`")));
    }
    Ok(Json(json!({ "key": key, "value": value })))
}

/// PUT /api/settings/{key}
async fn put_setting(
    State(state): State<AppState>,
    principal: Principal,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, DeskError> {
    state.app_settings.set(&key, &value).await?;
    tracing::info!(user_id = principal.user_id, key = %key, "Application setting updated");
    Ok(Json(json!({ "key": key, "value": value })))
}
