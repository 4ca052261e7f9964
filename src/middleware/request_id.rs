//! Request-id propagation.
//!
//! Accepts a well-formed `x-request-id` from the caller or mints one, opens a
//! per-request tracing span carrying it, and echoes it on the response.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

fn is_well_formed(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

fn incoming_request_id(req: &Request) -> Option<String> {
    let id = req.headers().get(&REQUEST_ID_HEADER)?.to_str().ok()?;
    is_well_formed(id).then(|| id.to_string())
}

pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = incoming_request_id(&req).unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri(),
    );

    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_ids() {
        assert!(is_well_formed("abc123"));
        assert!(is_well_formed("abc-123_XYZ"));
        assert!(is_well_formed(&"a".repeat(MAX_REQUEST_ID_LEN)));
    }

    #[test]
    fn test_malformed_ids() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("has space"));
        assert!(!is_well_formed("slash/y"));
        assert!(!is_well_formed(&"a".repeat(MAX_REQUEST_ID_LEN + 1)));
    }
}
