//! Request latency middleware.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::telemetry::record_request_latency;

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    record_request_latency(&method, &path, response.status().as_u16(), start.elapsed());
    response
}
