//! Integration tests for the route guard.

mod common;

use common::*;
use tourdesk::store::Store;

#[tokio::test]
async fn test_protected_path_without_session_redirects_to_login() {
    let app = TestApp::spawn().await;

    let response = app.get("/users").await;
    assert_redirect!(response, "/login");
}

#[tokio::test]
async fn test_root_without_session_redirects_to_login() {
    let app = TestApp::spawn().await;

    let response = app.get("/").await;
    assert_redirect!(response, "/login");
}

#[tokio::test]
async fn test_session_without_permission_redirects_to_unauthorized() {
    let app = TestApp::spawn().await;
    let user = create_plain_user(&app).await;
    app.login(&user.email, &user.password).await;

    let response = app.get("/users").await;
    assert_redirect!(response, "/unauthorized");
}

#[tokio::test]
async fn test_session_with_permission_passes_through() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let response = app.get("/users").await;
    assert_status!(response, 200);

    let response = app.get("/").await;
    assert_status!(response, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["service"], "tourdesk");
}

#[tokio::test]
async fn test_permission_is_scoped_per_page_subtree() {
    let app = TestApp::spawn().await;

    // user:read only; the roles page stays closed.
    let permission = app.seed_named_permission("user:read");
    let role = app.seed_role("user-viewer", &[permission]);
    let user = create_plain_user(&app).await;
    app.assign_roles(user.id, &[role]);
    app.login(&user.email, &user.password).await;

    let response = app.get("/users").await;
    assert_status!(response, 200);

    let response = app.get("/roles").await;
    assert_redirect!(response, "/unauthorized");
}

#[tokio::test]
async fn test_authenticated_user_on_auth_route_redirects_to_root() {
    let app = TestApp::spawn().await;
    let user = create_plain_user(&app).await;
    app.login(&user.email, &user.password).await;

    let response = app.get("/login").await;
    assert_redirect!(response, "/");
}

#[tokio::test]
async fn test_anonymous_user_reaches_auth_routes() {
    let app = TestApp::spawn().await;

    let response = app.get("/login").await;
    assert_status!(response, 200);
}

#[tokio::test]
async fn test_public_paths_skip_all_checks() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_status!(response, 200);

    let response = app.get("/health/ready").await;
    assert_status!(response, 200);

    let response = app.get("/unauthorized").await;
    assert_status!(response, 403);
}

#[tokio::test]
async fn test_unmatched_path_falls_through_under_default_allow() {
    let app = TestApp::spawn().await;

    // No rule matches, the default policy is allow, no handler exists.
    let response = app.get("/totally-unknown-path").await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn test_prefix_matching_respects_segment_boundaries() {
    let app = TestApp::spawn().await;

    // "/usersearch" must not inherit the "/users" rule.
    let response = app.get("/usersearch").await;
    assert_status!(response, 404);
}

#[tokio::test]
async fn test_default_deny_policy_closes_unlisted_paths() {
    let mut config = tourdesk::Config::default_for_testing();
    config.guard.default_policy = tourdesk::rbac::routes::DefaultPolicy::Deny;
    let app = TestApp::spawn_with(config).await;

    // "/me" carries no rule; under deny it is closed to anonymous callers...
    let response = app.get("/me").await;
    assert_redirect!(response, "/login");

    // ...and to authenticated ones without an explicit rule.
    let user = create_plain_user(&app).await;
    app.login(&user.email, &user.password).await;
    let response = app.get("/me").await;
    assert_redirect!(response, "/unauthorized");

    // Public and auth-only classifications still apply.
    assert_status!(app.get("/health").await, 200);
}

#[tokio::test]
async fn test_stale_cookie_degrades_to_anonymous() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/users", app.base_url))
        .header(reqwest::header::COOKIE, "sid=forged-session-token")
        .send()
        .await
        .unwrap();
    assert_redirect!(response, "/login");
}

#[tokio::test]
async fn test_deactivated_user_loses_access_mid_session() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;

    let response = app.get("/users").await;
    assert_status!(response, 200);

    app.store
        .update_user(
            admin.id,
            tourdesk::models::UserPatch {
                full_name: None,
                is_active: Some(false),
            },
        )
        .unwrap();

    let response = app.get("/users").await;
    assert_redirect!(response, "/login");
}
