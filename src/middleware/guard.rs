//! Route guard middleware.
//!
//! Runs once per request before handler dispatch. Classifies the path,
//! resolves the session cookie and the caller's effective permissions, and
//! resolves every decision to pass-through or redirect — it never errors to
//! the handler layer and performs no writes. A store failure denies; the
//! guard must not fail open.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use crate::auth::session::CurrentUser;
use crate::rbac::resolver::PermissionResolver;
use crate::rbac::routes::{DefaultPolicy, RouteClass};
use crate::telemetry::{record_guard_decision, GuardDecision};
use crate::AppState;

pub async fn route_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let routes = state.routes.clone();
    let path = req.uri().path().to_string();

    match routes.classify(&path) {
        RouteClass::Public => next.run(req).await,

        RouteClass::AuthOnly => {
            let jar = CookieJar::from_headers(req.headers());
            // A lookup failure counts as anonymous here so the auth pages
            // stay reachable when the store is down.
            let session = state.sessions.resolve(&jar).unwrap_or_else(|e| {
                warn!(error = %e, path = %path, "Session lookup failed on auth route");
                None
            });

            match session {
                Some(user) => {
                    debug!(user_id = %user.id, path = %path, "Authenticated user on auth-only route");
                    record_guard_decision(GuardDecision::RedirectedRoot);
                    Redirect::temporary(&routes.root_path).into_response()
                }
                None => next.run(req).await,
            }
        }

        RouteClass::Protected(required) => {
            let jar = CookieJar::from_headers(req.headers());
            let user = match state.sessions.resolve(&jar) {
                Ok(Some(user)) => user,
                Ok(None) => {
                    record_guard_decision(GuardDecision::RedirectedLogin);
                    return Redirect::temporary(&routes.login_path).into_response();
                }
                Err(e) => {
                    warn!(error = %e, path = %path, "Session lookup failed; denying");
                    record_guard_decision(GuardDecision::RedirectedLogin);
                    return Redirect::temporary(&routes.login_path).into_response();
                }
            };

            let mut resolver = PermissionResolver::new(state.store.clone());
            match resolver.has_permission(user.id, required) {
                Ok(true) => {
                    record_guard_decision(GuardDecision::Allowed);
                    req.extensions_mut().insert(CurrentUser(user));
                    next.run(req).await
                }
                Ok(false) => {
                    warn!(
                        user_id = %user.id,
                        path = %path,
                        required_permission = %required,
                        "Permission denied"
                    );
                    record_guard_decision(GuardDecision::RedirectedUnauthorized);
                    Redirect::temporary(&routes.unauthorized_path).into_response()
                }
                Err(e) => {
                    warn!(error = %e, path = %path, "Permission lookup failed; denying");
                    record_guard_decision(GuardDecision::RedirectedUnauthorized);
                    Redirect::temporary(&routes.unauthorized_path).into_response()
                }
            }
        }

        RouteClass::Unmatched => match routes.default_policy {
            DefaultPolicy::Allow => next.run(req).await,
            DefaultPolicy::Deny => {
                let jar = CookieJar::from_headers(req.headers());
                let session = state.sessions.resolve(&jar).unwrap_or(None);
                let target = match session {
                    Some(_) => &routes.unauthorized_path,
                    None => &routes.login_path,
                };
                debug!(path = %path, "Unlisted path denied by default policy");
                record_guard_decision(GuardDecision::DeniedByDefault);
                Redirect::temporary(target).into_response()
            }
        },
    }
}
