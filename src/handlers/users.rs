//! User management handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{store_error, ApiError, ApiResult},
    models::{Role, UserPatch},
    pagination::{PaginationMeta, PaginationParams},
    store::Store,
    AppState,
};

use super::auth::UserResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersListResponse {
    pub data: Vec<UserResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    #[schema(example = "Dana Fields")]
    pub full_name: Option<String>,
    #[schema(example = false)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetUserRolesRequest {
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of users", body = UsersListResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<UsersListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let (users, total_count) = state.store.list_users(limit, offset).map_err(store_error)?;

    Ok(Json(UsersListResponse {
        data: users.into_iter().map(UserResponse::from).collect(),
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    put,
    path = "/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "No fields to update", body = super::auth::ErrorResponse),
        (status = 404, description = "User not found", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    if payload.full_name.is_none() && payload.is_active.is_none() {
        return Err(ApiError::bad_request(
            "At least one field (full_name or is_active) must be provided",
            "NO_FIELDS_TO_UPDATE",
        ));
    }

    let patch = UserPatch {
        full_name: payload.full_name,
        is_active: payload.is_active,
    };

    let user = state
        .store
        .update_user(user_id, patch)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    info!(user_id = %user_id, is_active = user.is_active, "Updated user");

    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/roles",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = SetUserRolesRequest,
    responses(
        (status = 200, description = "Role set replaced", body = UserRolesResponse),
        (status = 404, description = "User not found", body = super::auth::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn set_user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetUserRolesRequest>,
) -> ApiResult<Json<UserRolesResponse>> {
    let user = state
        .store
        .find_user_by_id(user_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    state
        .store
        .replace_user_roles(user.id, &payload.role_ids)
        .map_err(store_error)?;

    let roles = state
        .store
        .find_roles_for_user(user.id)
        .map_err(store_error)?;

    info!(user_id = %user.id, role_count = roles.len(), "Replaced user roles");

    Ok(Json(UserRolesResponse {
        user_id: user.id,
        roles,
    }))
}
