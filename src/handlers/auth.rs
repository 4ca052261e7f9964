//! Authentication handlers.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{
        client_ip, record_login, user_agent, LoginOutcome, REASON_ACCOUNT_INACTIVE,
        REASON_INVALID_PASSWORD, REASON_PASSWORD_NOT_SET,
    },
    auth::{
        password::PasswordService,
        session::CurrentUser,
        token::{generate_token, generate_uuid, hash_token},
    },
    error::{store_error, ApiError, ApiResult},
    models::{NewUser, User},
    rbac::resolver::PermissionResolver,
    store::Store,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "agent@tourdesk.example")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "securepassword123", min_length = 8)]
    pub password: String,
    #[schema(example = "Dana Fields")]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "agent@tourdesk.example")]
    pub email: String,
    #[schema(example = "securepassword123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "agent@tourdesk.example")]
    pub email: String,
    #[schema(example = "Dana Fields")]
    pub full_name: Option<String>,
    #[schema(example = true)]
    pub is_active: bool,
    #[schema(example = false)]
    pub email_verified: bool,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            email_verified: user.email_verified_at.is_some(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user: UserResponse,
    /// Handed to the mailer by the caller; email delivery is not this
    /// service's concern.
    #[schema(example = "a1b2c3d4e5f6...")]
    pub verification_token: String,
}

#[derive(Debug, Serialize, ToSchema, Default)]
pub struct ErrorResponse {
    #[schema(example = "Invalid credentials")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "INVALID_CREDENTIALS")]
    pub code: Option<String>,
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration successful", body = RegisterResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_iterations(&payload.password, state.password_iterations)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let new_user = NewUser {
        id: generate_uuid(),
        email: payload.email.to_lowercase(),
        password_hash: Some(password_hash),
        full_name: payload.full_name,
    };

    let user = state.store.create_user(new_user).map_err(|e| {
        warn!(error = %e, "Failed to register user");
        ApiError::conflict("User with this email already exists", "USER_EXISTS")
    })?;

    // The account starts unverified; the emailed token flips it.
    let verification_token = generate_token();
    let expires_at =
        (Utc::now() + Duration::hours(state.verification_token_ttl_hours)).naive_utc();
    state
        .store
        .create_verification_token(user.id, &hash_token(&verification_token), expires_at)
        .map_err(store_error)?;

    info!(user_id = %user.id, email = %user.email, "User registered");

    Ok(Json(RegisterResponse {
        user: user.into(),
        verification_token,
    }))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; session cookie set", body = LoginResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account inactive", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let ip = client_ip(&headers);
    let agent = user_agent(&headers);

    let user = state
        .store
        .find_user_by_email(&payload.email.to_lowercase())
        .map_err(store_error)?;

    // Same generic rejection whether the email exists or not.
    let Some(user) = user else {
        warn!(email = %payload.email, "Login attempt for non-existent user");
        record_auth_attempt("login", AuthOutcome::UnknownEmail);
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    };

    if !user.is_active {
        warn!(user_id = %user.id, "Login attempt for inactive user");
        record_auth_attempt("login", AuthOutcome::AccountInactive);
        record_login(
            &state.store,
            user.id,
            LoginOutcome::Failed,
            Some(REASON_ACCOUNT_INACTIVE),
            ip,
            agent,
        );
        return Err(ApiError::forbidden(
            "Account is inactive",
            "ACCOUNT_INACTIVE",
        ));
    }

    let Some(stored_hash) = user.password_hash.as_deref() else {
        // Invited but never provisioned a password.
        warn!(user_id = %user.id, "Login attempt for user without a password");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        record_login(
            &state.store,
            user.id,
            LoginOutcome::Failed,
            Some(REASON_PASSWORD_NOT_SET),
            ip,
            agent,
        );
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    };

    let is_valid = PasswordService::verify_password(&payload.password, stored_hash).map_err(|e| {
        error!(error = %e, user_id = %user.id, "Password verification error");
        ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
    })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        record_login(
            &state.store,
            user.id,
            LoginOutcome::Failed,
            Some(REASON_INVALID_PASSWORD),
            ip,
            agent,
        );
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    }

    let cookie = state.sessions.issue(&user).map_err(store_error)?;

    record_auth_attempt("login", AuthOutcome::Success);
    record_login(&state.store, user.id, LoginOutcome::Success, None, ip, agent);
    info!(user_id = %user.id, email = %user.email, "User logged in");

    Ok((jar.add(cookie), Json(LoginResponse { user: user.into() })))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Authentication",
    responses(
        (status = 204, description = "Logged out; session cookie cleared"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, StatusCode)> {
    let removal = state.sessions.revoke(&jar).map_err(store_error)?;
    info!("User logged out");
    Ok((jar.remove(removal), StatusCode::NO_CONTENT))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    /// Effective permission names, sorted: the union across all held roles.
    pub permissions: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user and effective permissions", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("session_cookie" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MeResponse>> {
    let mut resolver = PermissionResolver::new(state.store.clone());
    let permission_set = resolver.resolve(user.id).map_err(store_error)?;

    let mut permissions: Vec<String> = permission_set.iter().cloned().collect();
    permissions.sort();

    Ok(Json(MeResponse {
        user: user.into(),
        permissions,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "agent@tourdesk.example")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    /// Identical whether or not the account exists.
    #[schema(example = "If the account exists, a reset link has been issued")]
    pub message: String,
    /// The reset token for the mailer. Absent when no active account matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "a1b2c3d4e5f6...")]
    pub reset_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset initiated", body = ForgotPasswordResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<ForgotPasswordResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    const GENERIC_MESSAGE: &str = "If the account exists, a reset link has been issued";

    let user = state
        .store
        .find_user_by_email(&payload.email.to_lowercase())
        .map_err(store_error)?;

    let Some(user) = user.filter(|u| u.is_active) else {
        return Ok(Json(ForgotPasswordResponse {
            message: GENERIC_MESSAGE.to_string(),
            reset_token: None,
        }));
    };

    let token = generate_token();
    let expires_at = (Utc::now() + Duration::minutes(state.reset_token_ttl_mins)).naive_utc();
    state
        .store
        .create_password_reset_token(user.id, &hash_token(&token), expires_at)
        .map_err(store_error)?;

    info!(user_id = %user.id, "Password reset requested");

    Ok(Json(ForgotPasswordResponse {
        message: GENERIC_MESSAGE.to_string(),
        reset_token: Some(token),
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[schema(example = "abc123...")]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "newSecurePassword123", min_length = 8)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetPasswordResponse {
    #[schema(example = "Password has been reset")]
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successful", body = ResetPasswordResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ResetPasswordResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let password_hash =
        PasswordService::hash_password_with_iterations(&payload.password, state.password_iterations)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    // Token consumption, the password update, and session purge commit
    // together; unknown, expired, and used tokens are indistinguishable to
    // the caller.
    let user_id = state
        .store
        .consume_reset_token_and_update_password(&hash_token(&payload.token), &password_hash)
        .map_err(store_error)?;

    let Some(user_id) = user_id else {
        return Err(ApiError::bad_request(
            "Invalid or expired reset token",
            "INVALID_RESET_TOKEN",
        ));
    };

    info!(user_id = %user_id, "Password reset completed");

    Ok(Json(ResetPasswordResponse {
        message: "Password has been reset".to_string(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    #[schema(example = "abc123...")]
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyEmailResponse {
    #[schema(example = "Email address verified")]
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/verify-email",
    tag = "Authentication",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<Json<VerifyEmailResponse>> {
    let user_id = state
        .store
        .consume_verification_token(&hash_token(&payload.token))
        .map_err(store_error)?;

    let Some(user_id) = user_id else {
        return Err(ApiError::bad_request(
            "Invalid or expired verification link",
            "INVALID_VERIFICATION_TOKEN",
        ));
    };

    info!(user_id = %user_id, "Email verified");

    Ok(Json(VerifyEmailResponse {
        message: "Email address verified".to_string(),
    }))
}
