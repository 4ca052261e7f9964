//! Login-history auditing.
//!
//! Every authentication attempt appends an immutable record. Recording is
//! fire-and-forget: a storage failure is logged and must never fail or delay
//! the login flow it observes.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::warn;
use uuid::Uuid;

use crate::auth::token::generate_uuid;
use crate::models::NewLoginHistory;
use crate::store::Store;

pub const REASON_INVALID_PASSWORD: &str = "invalid_password";
pub const REASON_ACCOUNT_INACTIVE: &str = "account_inactive";
pub const REASON_PASSWORD_NOT_SET: &str = "password_not_set";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failed,
}

impl LoginOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginOutcome::Success => "success",
            LoginOutcome::Failed => "failed",
        }
    }
}

pub fn record_login(
    store: &Arc<dyn Store>,
    user_id: Uuid,
    outcome: LoginOutcome,
    reason: Option<&str>,
    ip_address: Option<String>,
    user_agent: Option<String>,
) {
    let entry = NewLoginHistory {
        id: generate_uuid(),
        user_id,
        status: outcome.as_str().to_string(),
        reason: reason.map(String::from),
        ip_address,
        user_agent,
    };

    if let Err(e) = store.create_login_history(entry) {
        warn!(
            user_id = %user_id,
            outcome = outcome.as_str(),
            error = %e,
            "Failed to record login history"
        );
    }
}

/// Client IP from `x-forwarded-for` (first entry) or `x-real-ip`. Behind the
/// reverse proxy these are the only sources; the raw socket address is the
/// proxy itself.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_client_ip_absent() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_login_outcome_labels() {
        assert_eq!(LoginOutcome::Success.as_str(), "success");
        assert_eq!(LoginOutcome::Failed.as_str(), "failed");
    }
}
