//! Common test utilities and helpers for integration tests.
//!
//! Each test spawns the real router on a loopback listener backed by a fresh
//! `MemoryStore`, so suites are fully isolated from each other and from any
//! external services.

#![allow(dead_code)]

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use tourdesk::auth::token::generate_uuid;
use tourdesk::models::{NewPermission, NewRole, NewUser};
use tourdesk::rbac::perms;
use tourdesk::store::{MemoryStore, Store};
use tourdesk::{create_router, AppState, Config};

/// A test application instance with its own HTTP client and base URL.
pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
}

/// Test user with credentials.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub password: String,
}

impl TestApp {
    /// Spawns a fresh application on an ephemeral port.
    pub async fn spawn() -> Self {
        Self::spawn_with(Config::default_for_testing()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), &config);
        let app = create_router(state, &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: Self::new_session(),
            base_url: format!("http://{}", addr),
            store,
        }
    }

    /// Cookie-aware client that does not follow redirects, so route-guard
    /// decisions stay observable as 307s.
    pub fn new_session() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build test client")
    }

    pub fn unique_email() -> String {
        format!("test_{}@example.com", Uuid::new_v4())
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.get_with(&self.client, path).await
    }

    pub async fn get_with(&self, client: &Client, path: &str) -> reqwest::Response {
        client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.post_with(&self.client, path, body).await
    }

    pub async fn post_with(&self, client: &Client, path: &str, body: Value) -> reqwest::Response {
        client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    pub async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send PUT request")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send DELETE request")
    }

    /// Registers a user over HTTP; returns the user and their email
    /// verification token.
    pub async fn register_user(&self, email: &str, password: &str) -> (TestUser, String) {
        let response = self
            .post_with(
                &Self::new_session(),
                "/register",
                json!({
                    "email": email,
                    "password": password,
                    "full_name": "Test User"
                }),
            )
            .await;
        assert!(
            response.status().is_success(),
            "registration failed: {}",
            response.status()
        );

        let body: Value = response.json().await.unwrap();
        let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
        let verification_token = body["verification_token"].as_str().unwrap().to_string();

        (
            TestUser {
                id,
                email: email.to_string(),
                password: password.to_string(),
            },
            verification_token,
        )
    }

    /// Logs in with the app's default client, capturing the session cookie.
    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.login_with(&self.client, email, password).await
    }

    pub async fn login_with(
        &self,
        client: &Client,
        email: &str,
        password: &str,
    ) -> reqwest::Response {
        self.post_with(
            client,
            "/login",
            json!({
                "email": email,
                "password": password
            }),
        )
        .await
    }

    // Seed helpers write reference data straight through the store, standing
    // in for the external bootstrap tooling.

    pub fn seed_permission(&self, resource: &str, action: &str) -> Uuid {
        self.store
            .create_permission(NewPermission {
                id: generate_uuid(),
                name: format!("{}:{}", resource, action),
                description: None,
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .expect("Failed to seed permission")
            .id
    }

    pub fn seed_named_permission(&self, name: &str) -> Uuid {
        let (resource, action) = name.split_once(':').expect("permission name format");
        self.seed_permission(resource, action)
    }

    pub fn seed_role(&self, name: &str, permission_ids: &[Uuid]) -> Uuid {
        self.store
            .create_role(
                NewRole {
                    id: generate_uuid(),
                    name: name.to_string(),
                    description: None,
                },
                permission_ids,
            )
            .expect("Failed to seed role")
            .id
    }

    pub fn assign_roles(&self, user_id: Uuid, role_ids: &[Uuid]) {
        self.store
            .replace_user_roles(user_id, role_ids)
            .expect("Failed to assign roles");
    }

    pub fn seed_user(&self, email: &str) -> Uuid {
        self.store
            .create_user(NewUser {
                id: generate_uuid(),
                email: email.to_string(),
                password_hash: None,
                full_name: None,
            })
            .expect("Failed to seed user")
            .id
    }

    /// Registers a user, grants the full dashboard permission set through an
    /// `admin` role, and signs them in on the app's default client.
    pub async fn create_admin(&self) -> TestUser {
        let permission_ids: Vec<Uuid> = [
            perms::DASHBOARD_VIEW,
            perms::USER_READ,
            perms::ROLE_READ,
            perms::PERMISSION_READ,
            perms::AUDIT_READ,
        ]
        .iter()
        .map(|name| self.seed_named_permission(name))
        .collect();

        let role_id = self.seed_role("admin", &permission_ids);

        let email = Self::unique_email();
        let (user, _) = self.register_user(&email, "adminPassword123").await;
        self.assign_roles(user.id, &[role_id]);

        let response = self.login(&user.email, &user.password).await;
        assert!(response.status().is_success(), "admin login failed");

        user
    }
}

/// Creates a registered user with no roles.
pub async fn create_plain_user(app: &TestApp) -> TestUser {
    let email = TestApp::unique_email();
    let (user, _) = app.register_user(&email, "password123").await;
    user
}

/// Asserts that a response has a specific status code.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $expected:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            $expected,
            "Expected status {}, got {}",
            $expected,
            $response.status()
        );
    };
}

/// Asserts that a response is a temporary redirect to the given location.
#[macro_export]
macro_rules! assert_redirect {
    ($response:expr, $location:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            307,
            "Expected redirect, got {}",
            $response.status()
        );
        assert_eq!(
            $response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|h| h.to_str().ok()),
            Some($location),
            "Unexpected redirect target"
        );
    };
}
