//! Cookie-backed session management.
//!
//! Each login mints a fresh opaque token stored client-side in an `HttpOnly`
//! cookie and server-side (hashed) in the `sessions` table. Logout and
//! password reset delete the server-side rows, so a leaked cookie dies with
//! its session.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::error;

use crate::auth::token::{generate_token, hash_token};
use crate::error::ApiError;
use crate::models::User;
use crate::store::{Store, StoreError};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_days: i64,
    /// `Secure` cookie attribute; on in production.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            ttl_days: 7,
            secure: false,
        }
    }
}

#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn Store>,
    config: SessionConfig,
}

impl Sessions {
    pub fn new(store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Mints a session token for the user, persists its hash, and returns the
    /// cookie to set: `HttpOnly`, path `/`, max-age equal to the session TTL.
    pub fn issue(&self, user: &User) -> Result<Cookie<'static>, StoreError> {
        let token = generate_token();
        let expires_at = (Utc::now() + Duration::days(self.config.ttl_days)).naive_utc();
        self.store
            .create_session(user.id, &hash_token(&token), expires_at)?;

        Ok(
            Cookie::build((self.config.cookie_name.clone(), token))
                .http_only(true)
                .secure(self.config.secure)
                .same_site(SameSite::Lax)
                .path("/")
                .max_age(time::Duration::days(self.config.ttl_days))
                .build(),
        )
    }

    /// Resolves the session cookie back to a user. A missing cookie, an
    /// unknown or expired token, or a deactivated account all resolve to
    /// `None` — anonymous, not an error.
    pub fn resolve(&self, jar: &CookieJar) -> Result<Option<User>, StoreError> {
        let Some(cookie) = jar.get(&self.config.cookie_name) else {
            return Ok(None);
        };
        let user = self.store.find_user_by_session(&hash_token(cookie.value()))?;
        Ok(user.filter(|u| u.is_active))
    }

    /// Deletes the server-side session (when a cookie is present) and returns
    /// a removal cookie for the jar.
    pub fn revoke(&self, jar: &CookieJar) -> Result<Cookie<'static>, StoreError> {
        if let Some(cookie) = jar.get(&self.config.cookie_name) {
            self.store.delete_session(&hash_token(cookie.value()))?;
        }
        let mut removal = Cookie::from(self.config.cookie_name.clone());
        removal.set_path("/");
        Ok(removal)
    }
}

/// The authenticated caller. The route guard inserts this into request
/// extensions on guarded paths; elsewhere the extractor falls back to
/// resolving the session cookie itself.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        match state.sessions.resolve(&jar) {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(ApiError::unauthorized(
                "Authentication required",
                "AUTH_REQUIRED",
            )),
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                Err(ApiError::internal("Session lookup failed", "SESSION_ERROR"))
            }
        }
    }
}
