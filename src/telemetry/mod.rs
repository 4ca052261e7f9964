pub mod metrics;
pub mod tracing;

pub use self::metrics::{
    metrics_handler, record_auth_attempt, record_guard_decision, record_request_latency,
    AuthOutcome, GuardDecision, MetricsState,
};
pub use self::tracing::{init_telemetry, shutdown_telemetry};
