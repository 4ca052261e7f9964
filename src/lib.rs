//! Tourdesk - backend for the tours & bookings admin dashboard.
//!
//! Cookie-session authentication, role-based access control enforced by a
//! route guard ahead of handler dispatch, and append-only login auditing.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod rbac;
pub mod schema;
pub mod store;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::password::PasswordPolicy;
use auth::session::Sessions;
use rbac::routes::RouteTable;
use store::Store;
use telemetry::MetricsState;

pub use config::Config;
pub use telemetry::tracing::shutdown_telemetry;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Sessions,
    pub routes: Arc<RouteTable>,
    pub password_policy: PasswordPolicy,
    pub password_iterations: u32,
    pub reset_token_ttl_mins: i64,
    pub verification_token_ttl_hours: i64,
    pub metrics: MetricsState,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let sessions = Sessions::new(store.clone(), config.session.clone());
        let routes = Arc::new(RouteTable::dashboard(config.guard.default_policy));

        let password_policy = if config.security.require_password_complexity {
            PasswordPolicy::complex(config.security.min_password_length)
        } else {
            PasswordPolicy {
                min_length: config.security.min_password_length,
                ..Default::default()
            }
        };

        let metrics = MetricsState::new(config.telemetry.metrics_enabled);

        Self {
            store,
            sessions,
            routes,
            password_policy,
            password_iterations: config.security.password_iterations,
            reset_token_ttl_mins: config.security.reset_token_ttl_mins,
            verification_token_ttl_hours: config.security.verification_token_ttl_hours,
            metrics,
        }
    }
}

pub fn create_router(state: AppState, config: &Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route("/unauthorized", get(handlers::pages::unauthorized))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route(
            "/login",
            get(handlers::pages::login_page).post(handlers::auth::login),
        )
        .route("/register", post(handlers::auth::register))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password", post(handlers::auth::reset_password))
        .route("/verify-email", post(handlers::auth::verify_email))
        .route("/logout", post(handlers::auth::logout))
        .route("/me", get(handlers::auth::me))
        .with_state(state.clone());

    // Page subtrees; the route guard maps each prefix to its required
    // permission before any of these handlers run.
    let page_routes = Router::new()
        .route("/", get(handlers::pages::dashboard))
        .route("/users", get(handlers::users::list_users))
        .route("/users/{user_id}", put(handlers::users::update_user))
        .route(
            "/users/{user_id}/roles",
            put(handlers::users::set_user_roles),
        )
        .route(
            "/roles",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        .route(
            "/roles/{role_id}",
            put(handlers::roles::update_role).delete(handlers::roles::delete_role),
        )
        .route(
            "/roles/{role_id}/permissions",
            get(handlers::roles::list_role_permissions),
        )
        .route(
            "/permissions",
            get(handlers::permissions::list_permissions)
                .post(handlers::permissions::create_permission),
        )
        .route(
            "/login-history",
            get(handlers::history::list_login_history),
        )
        .with_state(state.clone());

    Router::new()
        .merge(openapi::swagger_router())
        .merge(public_routes)
        .merge(auth_routes)
        .merge(page_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::guard::route_guard,
        ))
        .layer(axum_middleware::from_fn(
            middleware::metrics::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::request_id::request_id_middleware,
        ))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found", "code": "NOT_FOUND"})),
    )
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let cors = if config.cors.allow_credentials && is_wildcard_origin {
        // Credentials forbid a literal wildcard; mirror the caller instead.
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_credentials(true)
    } else if is_wildcard_origin {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(config.cors.allow_credentials)
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.cors.max_age_secs))
}

pub fn create_db_pool(config: &Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &Config) {
    telemetry::init_telemetry(config);
}
