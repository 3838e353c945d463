// HTTP tests for the admin API, driven through the router without a socket
//
// These tests verify:
// 1. Status mapping: 401 without a valid token, 403 on deny, 500 on storage faults
// 2. Login, logout and the effective permission set
// 3. Catalog, role and override administration
// 4. The application settings endpoints

mod helpers;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use helpers::{seed_test_user, TestDb, UserBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde_json::{json, Value};
use tower::ServiceExt;
use visadesk::access::catalog::{self, CATALOG};
use visadesk::settings::Settings;
use visadesk::storage;
use visadesk::web::{self, AppState};

/// Router over a migrated, catalog-seeded database
struct TestApp {
    db: TestDb,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let db = TestDb::new().await;
        catalog::seed_catalog(db.connection())
            .await
            .expect("Failed to seed catalog");
        let state = AppState::new(Settings::default(), db.connection().clone());
        Self {
            router: web::router(state),
            db,
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.db.connection()
    }

    /// Create a user with `role` and return a bearer token for it
    async fn token_for(&self, username: &str, role: &str) -> (i32, String) {
        let user = seed_test_user(self.db(), username, role).await;
        let token = storage::issue_access_token(self.db(), user.id, 3600)
            .await
            .expect("Failed to issue token");
        (user.id, token.token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response is not JSON")
        };
        (status, value)
    }
}

fn permission_id(list: &Value, code: &str) -> i64 {
    list.as_array()
        .expect("Expected array")
        .iter()
        .find(|p| p["code"] == code)
        .and_then(|p| p["id"].as_i64())
        .unwrap_or_else(|| panic!("permission {code} not listed"))
}

#[tokio::test]
async fn test_healthz_sets_security_headers() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("cache-control").unwrap(), "no-store");
}

#[tokio::test]
async fn test_missing_or_invalid_token_is_unauthenticated() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/permissions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Authentication required"}));

    let (status, _) = app
        .send(Method::GET, "/api/permissions", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_disabled_user_token_is_rejected() {
    let app = TestApp::new().await;
    let user = UserBuilder::new("gone").disabled().create(app.db()).await;
    let token = storage::issue_access_token(app.db(), user.id, 3600)
        .await
        .unwrap();

    let (status, _) = app
        .send(Method::GET, "/api/permissions/me", Some(&token.token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_denied_route_returns_forbidden() {
    let app = TestApp::new().await;
    let (_, token) = app.token_for("field", "agent").await;

    let (status, body) = app
        .send(Method::GET, "/api/permissions", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": "Permission denied"}));
}

#[tokio::test]
async fn test_admin_lists_catalog() {
    let app = TestApp::new().await;
    let (_, token) = app.token_for("root", "admin").await;

    let (status, body) = app
        .send(Method::GET, "/api/permissions", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), CATALOG.len());

    let (status, body) = app
        .send(
            Method::GET,
            "/api/permissions?category=settings",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["settings.update", "settings.view"]);
}

#[tokio::test]
async fn test_login_me_logout() {
    let app = TestApp::new().await;
    UserBuilder::new("clerk")
        .with_password("s3cret-pass")
        .with_role("staff")
        .create(app.db())
        .await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "clerk", "password": "s3cret-pass"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "clerk");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["permissions"]["applications.view"], true);
    assert!(body["permissions"].get("settings.update").is_none());
    let token = body["token"].as_str().expect("token").to_string();

    let (status, body) = app
        .send(Method::GET, "/api/auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "staff");

    let (status, _) = app
        .send(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(Method::GET, "/api/auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_and_disabled_accounts() {
    let app = TestApp::new().await;
    UserBuilder::new("clerk").create(app.db()).await;
    UserBuilder::new("gone").disabled().create(app.db()).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "clerk", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Authentication required"}));

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"username": "gone", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_permission_crud() {
    let app = TestApp::new().await;
    let (_, admin) = app.token_for("root", "admin").await;
    let (_, staff) = app.token_for("clerk", "staff").await;

    let new_permission = json!({
        "code": "invoices.view",
        "name": "View invoices",
        "category": "invoices"
    });

    let (status, _) = app
        .send(
            Method::POST,
            "/api/permissions",
            Some(&staff),
            Some(new_permission.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .send(
            Method::POST,
            "/api/permissions",
            Some(&admin),
            Some(new_permission.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["code"], "invoices.view");
    let id = created["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/permissions",
            Some(&admin),
            Some(new_permission),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("invoices.view"));

    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/api/permissions/{id}"),
            Some(&admin),
            Some(json!({"name": "Read invoices", "description": "Open invoices"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Read invoices");
    assert_eq!(updated["code"], "invoices.view");

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/permissions/{id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/permissions/{id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_permissions_replace_via_api() {
    let app = TestApp::new().await;
    let (_, admin) = app.token_for("root", "admin").await;
    let (_, staff) = app.token_for("clerk", "staff").await;

    let (_, catalog) = app
        .send(Method::GET, "/api/permissions", Some(&admin), None)
        .await;
    let reports = permission_id(&catalog, "reports.view");
    let settings_view = permission_id(&catalog, "settings.view");

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/roles/staff/permissions",
            Some(&admin),
            Some(json!([
                {"permission_id": reports, "granted": false},
                {"permission_id": settings_view, "granted": true}
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    // Fresh checks see the new policy immediately.
    let (_, me) = app
        .send(Method::GET, "/api/permissions/me", Some(&staff), None)
        .await;
    assert_eq!(me["permissions"]["settings.view"], true);
    assert_eq!(me["permissions"]["reports.view"], false);
    assert!(me["permissions"].get("applications.view").is_none());

    let (status, _) = app
        .send(Method::GET, "/api/settings", Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/roles/staff/permissions",
            Some(&staff),
            Some(json!([])),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_replace_validation() {
    let app = TestApp::new().await;
    let (_, admin) = app.token_for("root", "admin").await;

    let (_, catalog) = app
        .send(Method::GET, "/api/permissions", Some(&admin), None)
        .await;
    let reports = permission_id(&catalog, "reports.view");

    let (status, _) = app
        .send(
            Method::GET,
            "/api/roles/janitor/permissions",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/roles/janitor/permissions",
            Some(&admin),
            Some(json!([])),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/roles/agent/permissions",
            Some(&admin),
            Some(json!([{"permission_id": 99999, "granted": true}])),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("99999"));

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/roles/agent/permissions",
            Some(&admin),
            Some(json!([
                {"permission_id": reports, "granted": true},
                {"permission_id": reports, "granted": false}
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The seeded agent defaults are still in place.
    let (status, body) = app
        .send(
            Method::GET,
            "/api/roles/agent/permissions",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_overrides_via_api() {
    let app = TestApp::new().await;
    let (_, admin) = app.token_for("root", "admin").await;
    let (clerk_id, clerk) = app.token_for("clerk", "staff").await;
    let (_, field) = app.token_for("field", "agent").await;

    let (_, catalog) = app
        .send(Method::GET, "/api/permissions", Some(&admin), None)
        .await;
    let view = permission_id(&catalog, "applications.view");

    let uri = format!("/api/users/{clerk_id}/permissions");
    let (status, body) = app
        .send(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!([{"permission_id": view, "granted": false}])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["code"], "applications.view");
    assert_eq!(body[0]["granted"], false);

    // Staff holds users.view, which satisfies the any-of guard.
    let (status, body) = app.send(Method::GET, &uri, Some(&clerk), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Agents hold neither permissions.view nor users.view.
    let (status, _) = app.send(Method::GET, &uri, Some(&field), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/permissions/check",
            Some(&clerk),
            Some(json!({"codes": ["applications.view", "customers.view"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["applications.view"], false);
    assert_eq!(body["results"]["customers.view"], true);
    assert_eq!(body["allowed"], false);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/permissions/check",
            Some(&clerk),
            Some(json!({"codes": ["applications.view", "customers.view"], "any": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (status, _) = app
        .send(
            Method::GET,
            "/api/users/99999/permissions",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/users/99999/permissions",
            Some(&admin),
            Some(json!([])),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_endpoints() {
    let app = TestApp::new().await;
    let (_, admin) = app.token_for("root", "admin").await;
    let (_, clerk) = app.token_for("clerk", "staff").await;

    let (status, _) = app
        .send(Method::GET, "/api/settings/sms_sender", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/settings/sms_sender",
            Some(&admin),
            Some(json!({"name": "VISADESK", "enabled": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "sms_sender");

    let (status, body) = app
        .send(Method::GET, "/api/settings/sms_sender", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"]["name"], "VISADESK");

    let (status, body) = app
        .send(Method::GET, "/api/settings", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sms_sender"]["enabled"], true);

    let (status, _) = app
        .send(Method::GET, "/api/settings", Some(&clerk), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/settings/sms_sender",
            Some(&clerk),
            Some(json!("x")),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_storage_fault_returns_internal_error() {
    let app = TestApp::new().await;
    let (_, clerk) = app.token_for("clerk", "staff").await;

    app.db()
        .execute_unprepared("DROP TABLE role_permissions")
        .await
        .expect("Failed to drop table");

    let (status, body) = app
        .send(Method::GET, "/api/permissions", Some(&clerk), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal server error"}));
}
