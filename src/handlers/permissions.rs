//! Permission reference-data handlers.
//!
//! Permissions are seeded once and treated as effectively immutable; the
//! create endpoint exists for operators extending the catalog. Names follow
//! the `resource:action` convention and are derived, not free-typed.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::token::generate_uuid,
    error::{store_error, ApiError, ApiResult},
    models::{NewPermission, Permission},
    pagination::{PaginationMeta, PaginationParams},
    store::Store,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, message = "Resource must not be empty"))]
    #[schema(example = "vendor")]
    pub resource: String,
    #[validate(length(min = 1, message = "Action must not be empty"))]
    #[schema(example = "read")]
    pub action: String,
    #[schema(example = "View vendor statistics")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub permission: Permission,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsListResponse {
    pub data: Vec<Permission>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/permissions",
    tag = "Permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 200, description = "Permission created", body = PermissionResponse),
        (status = 400, description = "Validation error", body = super::auth::ErrorResponse),
        (status = 409, description = "Permission already exists", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<CreatePermissionRequest>,
) -> ApiResult<Json<PermissionResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let name = format!("{}:{}", payload.resource, payload.action);

    let permission = state
        .store
        .create_permission(NewPermission {
            id: generate_uuid(),
            name,
            description: payload.description,
            resource: payload.resource,
            action: payload.action,
        })
        .map_err(|_| ApiError::conflict("Permission already exists", "PERMISSION_EXISTS"))?;

    info!(permission_id = %permission.id, name = %permission.name, "Created permission");

    Ok(Json(PermissionResponse { permission }))
}

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Permissions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of permissions", body = PermissionsListResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PermissionsListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let (permissions, total_count) = state
        .store
        .list_permissions(limit, offset)
        .map_err(store_error)?;

    Ok(Json(PermissionsListResponse {
        data: permissions,
        pagination: pagination.into_metadata(total_count),
    }))
}
