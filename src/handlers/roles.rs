//! Role management handlers.
//!
//! A role update is one transaction: rename, description, and the
//! delete-then-reinsert permission sync commit together. The `admin` role's
//! name is immutable and the role cannot be deleted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::token::generate_uuid,
    error::{store_error, ApiError, ApiResult},
    models::{NewRole, Permission, Role, RolePatch},
    pagination::{PaginationMeta, PaginationParams},
    rbac::ADMIN_ROLE_NAME,
    store::Store,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, message = "Role name must not be empty"))]
    #[schema(example = "operator")]
    pub name: String,
    #[schema(example = "Handles day-to-day bookings")]
    pub description: Option<String>,
    pub permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    #[schema(example = "senior-operator")]
    pub name: Option<String>,
    #[schema(example = "Senior booking operator")]
    pub description: Option<String>,
    /// Replaces the role's whole permission set when present.
    pub permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolesListResponse {
    pub data: Vec<Role>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolePermissionsResponse {
    pub role_id: Uuid,
    pub data: Vec<Permission>,
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 200, description = "Role created", body = RoleResponse),
        (status = 400, description = "Validation error", body = super::auth::ErrorResponse),
        (status = 409, description = "Role already exists", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let new_role = NewRole {
        id: generate_uuid(),
        name: payload.name,
        description: payload.description,
    };

    let role = state
        .store
        .create_role(new_role, payload.permission_ids.as_deref().unwrap_or(&[]))
        .map_err(|_| ApiError::conflict("Role already exists", "ROLE_EXISTS"))?;

    info!(role_id = %role.id, role_name = %role.name, "Created role");

    Ok(Json(RoleResponse { role }))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of roles", body = RolesListResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<RolesListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let (roles, total_count) = state.store.list_roles(limit, offset).map_err(store_error)?;

    Ok(Json(RolesListResponse {
        data: roles,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    put,
    path = "/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 400, description = "Invalid request", body = super::auth::ErrorResponse),
        (status = 404, description = "Role not found", body = super::auth::ErrorResponse),
        (status = 409, description = "Admin role cannot be renamed", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    if payload.name.is_none() && payload.description.is_none() && payload.permission_ids.is_none() {
        return Err(ApiError::bad_request(
            "At least one field (name, description, permission_ids) must be provided",
            "NO_FIELDS_TO_UPDATE",
        ));
    }

    let role = state
        .store
        .find_role(role_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))?;

    if role.name == ADMIN_ROLE_NAME {
        if let Some(ref new_name) = payload.name {
            if new_name != ADMIN_ROLE_NAME {
                return Err(ApiError::conflict(
                    "The admin role cannot be renamed",
                    "ADMIN_ROLE_IMMUTABLE",
                ));
            }
        }
    }

    let patch = RolePatch {
        name: payload.name,
        description: payload.description,
        permission_ids: payload.permission_ids,
    };

    let updated = state
        .store
        .update_role(role_id, patch)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))?;

    info!(role_id = %role_id, role_name = %updated.name, "Updated role");

    Ok(Json(RoleResponse { role: updated }))
}

#[utoipa::path(
    delete,
    path = "/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = super::auth::ErrorResponse),
        (status = 409, description = "Admin role cannot be deleted", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let role = state
        .store
        .find_role(role_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))?;

    if role.name == ADMIN_ROLE_NAME {
        return Err(ApiError::conflict(
            "The admin role cannot be deleted",
            "ADMIN_ROLE_PROTECTED",
        ));
    }

    let deleted = state.store.delete_role(role_id).map_err(store_error)?;
    if !deleted {
        return Err(ApiError::not_found("Role not found", "ROLE_NOT_FOUND"));
    }

    info!(role_id = %role_id, role_name = %role.name, "Deleted role");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/roles/{role_id}/permissions",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Permissions granted by the role", body = RolePermissionsResponse),
        (status = 404, description = "Role not found", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn list_role_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<RolePermissionsResponse>> {
    let role = state
        .store
        .find_role(role_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))?;

    let data = state
        .store
        .list_role_permissions(role.id)
        .map_err(store_error)?;

    Ok(Json(RolePermissionsResponse {
        role_id: role.id,
        data,
    }))
}
