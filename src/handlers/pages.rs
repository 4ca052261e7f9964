//! Guard-facing page endpoints: the application root and the redirect
//! targets the guard points denied requests at.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::session::CurrentUser;
use crate::error::ApiError;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    #[schema(example = "tourdesk")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub user: super::auth::UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginPageResponse {
    #[schema(example = "Sign in with POST /login")]
    pub message: String,
}

/// The application root; the guard requires `dashboard:view` and has already
/// resolved the caller.
#[utoipa::path(
    get,
    path = "/",
    tag = "Pages",
    responses(
        (status = 200, description = "Dashboard landing data", body = DashboardResponse),
        (status = 307, description = "Redirected by the route guard")
    ),
    security(("session_cookie" = []))
)]
pub async fn dashboard(CurrentUser(user): CurrentUser) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        service: "tourdesk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        user: user.into(),
    })
}

#[utoipa::path(
    get,
    path = "/login",
    tag = "Pages",
    responses(
        (status = 200, description = "Login page stub", body = LoginPageResponse),
        (status = 307, description = "Already authenticated; redirected to /")
    )
)]
pub async fn login_page() -> Json<LoginPageResponse> {
    Json(LoginPageResponse {
        message: "Sign in with POST /login".to_string(),
    })
}

/// Target of the guard's authorization redirects. Distinct from the login
/// page so operators can tell "not logged in" from "logged in, forbidden".
#[utoipa::path(
    get,
    path = "/unauthorized",
    tag = "Pages",
    responses(
        (status = 403, description = "Caller lacks the required permission", body = ApiError)
    )
)]
pub async fn unauthorized() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::FORBIDDEN,
        Json(ApiError::new(
            "You do not have permission to access this page",
            "FORBIDDEN",
        )),
    )
}
