//! OpenAPI documentation configuration.

use axum::Router;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::auth::{
    ErrorResponse, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, LoginResponse,
    MeResponse, RegisterRequest, RegisterResponse, ResetPasswordRequest, ResetPasswordResponse,
    UserResponse, VerifyEmailRequest, VerifyEmailResponse,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tourdesk API",
        version = "0.1.0",
        description = "Backend for the tours & bookings admin dashboard.\n\n\
        ## Authentication\n\
        Sessions are cookie-based. POST `/login` with valid credentials sets an\n\
        `HttpOnly` session cookie (7-day lifetime); POST `/logout` clears it.\n\n\
        ## Authorization\n\
        Every request passes the route guard before handler dispatch. Page\n\
        subtrees map to required permissions (`resource:action` names resolved\n\
        as the union across the caller's roles); a missing session redirects to\n\
        `/login`, a missing permission to `/unauthorized`.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Pages", description = "Dashboard root and guard redirect targets"),
        (name = "Authentication", description = "Login, registration, and account flows"),
        (name = "Users", description = "User administration"),
        (name = "Roles", description = "Role administration"),
        (name = "Permissions", description = "Permission reference data"),
        (name = "Audit", description = "Login history")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::pages::dashboard,
        crate::handlers::pages::login_page,
        crate::handlers::pages::unauthorized,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::auth::verify_email,

        crate::handlers::users::list_users,
        crate::handlers::users::update_user,
        crate::handlers::users::set_user_roles,

        crate::handlers::roles::create_role,
        crate::handlers::roles::list_roles,
        crate::handlers::roles::update_role,
        crate::handlers::roles::delete_role,
        crate::handlers::roles::list_role_permissions,

        crate::handlers::permissions::create_permission,
        crate::handlers::permissions::list_permissions,

        crate::handlers::history::list_login_history,
    ),
    components(
        schemas(
            RegisterRequest,
            RegisterResponse,
            LoginRequest,
            LoginResponse,
            MeResponse,
            UserResponse,
            ErrorResponse,
            ForgotPasswordRequest,
            ForgotPasswordResponse,
            ResetPasswordRequest,
            ResetPasswordResponse,
            VerifyEmailRequest,
            VerifyEmailResponse,

            PaginationMeta,

            crate::error::ApiError,
            crate::models::Role,
            crate::models::Permission,
            crate::models::LoginHistory,

            crate::handlers::pages::DashboardResponse,
            crate::handlers::pages::LoginPageResponse,

            crate::handlers::users::UsersListResponse,
            crate::handlers::users::UpdateUserRequest,
            crate::handlers::users::SetUserRolesRequest,
            crate::handlers::users::UserRolesResponse,

            crate::handlers::roles::CreateRoleRequest,
            crate::handlers::roles::UpdateRoleRequest,
            crate::handlers::roles::RoleResponse,
            crate::handlers::roles::RolesListResponse,
            crate::handlers::roles::RolePermissionsResponse,

            crate::handlers::permissions::CreatePermissionRequest,
            crate::handlers::permissions::PermissionResponse,
            crate::handlers::permissions::PermissionsListResponse,

            crate::handlers::history::LoginHistoryListResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "sid",
                    "Session cookie issued by POST /login",
                ))),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
