//! Integration tests for role administration and permission resolution.

mod common;

use std::sync::Arc;

use common::*;
use serde_json::{json, Value};
use tourdesk::auth::token::generate_uuid;
use tourdesk::models::{NewPermission, NewRole, RolePatch};
use tourdesk::store::{MemoryStore, Store};

#[tokio::test]
async fn test_effective_permissions_are_union_of_roles() {
    let app = TestApp::spawn().await;

    let booking_read = app.seed_named_permission("booking:read");
    let vendor_write = app.seed_named_permission("vendor:write");
    let viewer = app.seed_role("viewer", &[booking_read]);
    let editor = app.seed_role("editor", &[vendor_write]);

    let user = create_plain_user(&app).await;
    app.assign_roles(user.id, &[viewer, editor]);
    app.login(&user.email, &user.password).await;

    let body: Value = app.get("/me").await.json().await.unwrap();
    assert_eq!(
        body["permissions"],
        json!(["booking:read", "vendor:write"])
    );

    // Dropping a role shrinks the union on the next request.
    app.assign_roles(user.id, &[viewer]);
    let body: Value = app.get("/me").await.json().await.unwrap();
    assert_eq!(body["permissions"], json!(["booking:read"]));
}

#[tokio::test]
async fn test_admin_can_replace_a_users_roles_over_http() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let role = app.seed_role("operator", &[]);
    let user = create_plain_user(&app).await;

    let response = app
        .put(
            &format!("/users/{}/roles", user.id),
            json!({ "role_ids": [role] }),
        )
        .await;
    assert_status!(response, 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["roles"][0]["name"], "operator");
}

#[tokio::test]
async fn test_admin_role_cannot_be_renamed() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let body: Value = app.get("/roles?per_page=50").await.json().await.unwrap();
    let admin_role_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .and_then(|r| r["id"].as_str())
        .unwrap()
        .to_string();

    let response = app
        .put(
            &format!("/roles/{}", admin_role_id),
            json!({ "name": "superuser" }),
        )
        .await;
    assert_status!(response, 409);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ADMIN_ROLE_IMMUTABLE");
}

#[tokio::test]
async fn test_non_admin_role_renames_in_place() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let response = app
        .post("/roles", json!({ "name": "operator", "description": "ops" }))
        .await;
    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    let role_id = body["role"]["id"].as_str().unwrap().to_string();

    let response = app
        .put(
            &format!("/roles/{}", role_id),
            json!({ "name": "senior-operator" }),
        )
        .await;
    assert_status!(response, 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"]["name"], "senior-operator");
}

#[tokio::test]
async fn test_admin_role_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let body: Value = app.get("/roles?per_page=50").await.json().await.unwrap();
    let admin_role_id = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "admin")
        .and_then(|r| r["id"].as_str())
        .unwrap()
        .to_string();

    let response = app.delete(&format!("/roles/{}", admin_role_id)).await;
    assert_status!(response, 409);
}

#[tokio::test]
async fn test_duplicate_role_name_conflicts() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let response = app.post("/roles", json!({ "name": "operator" })).await;
    assert_status!(response, 200);

    let response = app.post("/roles", json!({ "name": "operator" })).await;
    assert_status!(response, 409);
}

#[tokio::test]
async fn test_role_update_replaces_permission_set() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let booking_read = app.seed_named_permission("booking:read");
    let vendor_write = app.seed_named_permission("vendor:write");

    let response = app
        .post(
            "/roles",
            json!({ "name": "operator", "permission_ids": [booking_read] }),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    let role_id = body["role"]["id"].as_str().unwrap().to_string();

    // Sync is delete-all-then-reinsert, not a diff.
    let response = app
        .put(
            &format!("/roles/{}", role_id),
            json!({ "permission_ids": [vendor_write] }),
        )
        .await;
    assert_status!(response, 200);

    let body: Value = app
        .get(&format!("/roles/{}/permissions", role_id))
        .await
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["vendor:write"]);
}

#[tokio::test]
async fn test_permission_create_derives_name_from_resource_and_action() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let response = app
        .post(
            "/permissions",
            json!({ "resource": "vendor", "action": "read", "description": "View vendors" }),
        )
        .await;
    assert_status!(response, 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["permission"]["name"], "vendor:read");
}

#[tokio::test]
async fn test_update_role_requires_some_field() {
    let app = TestApp::spawn().await;
    app.create_admin().await;

    let response = app.post("/roles", json!({ "name": "operator" })).await;
    let body: Value = response.json().await.unwrap();
    let role_id = body["role"]["id"].as_str().unwrap().to_string();

    let response = app.put(&format!("/roles/{}", role_id), json!({})).await;
    assert_status!(response, 400);
}

/// Permission sync is atomic: a reader resolving concurrently with a
/// replace-one-set-with-another sync must never observe an empty set.
#[test]
fn test_concurrent_resolution_never_sees_partial_sync() {
    let store = Arc::new(MemoryStore::new());

    let make_permission = |name: &str| {
        let (resource, action) = name.split_once(':').unwrap();
        store
            .create_permission(NewPermission {
                id: generate_uuid(),
                name: name.to_string(),
                description: None,
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .unwrap()
            .id
    };

    let old_set = vec![make_permission("booking:read"), make_permission("tour:read")];
    let new_set = vec![
        make_permission("booking:write"),
        make_permission("tour:write"),
    ];

    let role = store
        .create_role(
            NewRole {
                id: generate_uuid(),
                name: "operator".to_string(),
                description: None,
            },
            &old_set,
        )
        .unwrap();

    let user = store
        .create_user(tourdesk::models::NewUser {
            id: generate_uuid(),
            email: "concurrent@example.com".to_string(),
            password_hash: None,
            full_name: None,
        })
        .unwrap();
    store.replace_user_roles(user.id, &[role.id]).unwrap();

    let writer = {
        let store = store.clone();
        let (old_set, new_set) = (old_set.clone(), new_set.clone());
        std::thread::spawn(move || {
            for i in 0..500 {
                let next = if i % 2 == 0 { &new_set } else { &old_set };
                store
                    .update_role(
                        role.id,
                        RolePatch {
                            permission_ids: Some(next.clone()),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                let names = store.find_permission_names_for_user(user.id).unwrap();
                assert_eq!(names.len(), 2, "observed a partially synced role");
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}
