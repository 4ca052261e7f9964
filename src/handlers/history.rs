//! Login-history listing.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{store_error, ApiResult},
    models::LoginHistory,
    pagination::{PaginationMeta, PaginationParams},
    store::Store,
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    /// Restrict to a single user's attempts.
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginHistoryListResponse {
    pub data: Vec<LoginHistory>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    get,
    path = "/login-history",
    tag = "Audit",
    params(PaginationParams, HistoryFilter),
    responses(
        (status = 200, description = "Login attempts, newest first", body = LoginHistoryListResponse),
        (status = 500, description = "Internal server error", body = super::auth::ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn list_login_history(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Json<LoginHistoryListResponse>> {
    let (limit, offset) = pagination.limit_offset();
    let (entries, total_count) = state
        .store
        .list_login_history(filter.user_id, limit, offset)
        .map_err(store_error)?;

    Ok(Json(LoginHistoryListResponse {
        data: entries,
        pagination: pagination.into_metadata(total_count),
    }))
}
