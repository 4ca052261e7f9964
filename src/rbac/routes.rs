//! Route classification for the guard.

use super::perms;

/// What the guard does with paths no rule matches. `Allow` preserves the
/// dashboard's documented open-by-default behavior; `Deny` is the hardened
/// posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

impl DefaultPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "allow" => Some(DefaultPolicy::Allow),
            "deny" => Some(DefaultPolicy::Deny),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    pub prefix: String,
    pub permission: String,
}

/// How the guard treats one inbound path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass<'a> {
    /// Pass through with no checks.
    Public,
    /// Login/register/reset/verify surface: anonymous passes, an
    /// authenticated caller is bounced to the root.
    AuthOnly,
    /// Requires a session holding the named permission.
    Protected(&'a str),
    /// No rule matched; the default policy decides.
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    pub public_prefixes: Vec<String>,
    pub auth_only_prefixes: Vec<String>,
    pub protected: Vec<RouteRule>,
    pub default_policy: DefaultPolicy,
    pub login_path: String,
    pub unauthorized_path: String,
    pub root_path: String,
}

/// Prefix match on path-segment boundaries: `/users` covers `/users` and
/// `/users/42` but not `/usersearch`. The root prefix only matches exactly.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl RouteTable {
    /// The dashboard's route map: one permission per page subtree.
    pub fn dashboard(default_policy: DefaultPolicy) -> Self {
        let protected = [
            ("/", perms::DASHBOARD_VIEW),
            ("/users", perms::USER_READ),
            ("/roles", perms::ROLE_READ),
            ("/permissions", perms::PERMISSION_READ),
            ("/login-history", perms::AUDIT_READ),
        ]
        .into_iter()
        .map(|(prefix, permission)| RouteRule {
            prefix: prefix.to_string(),
            permission: permission.to_string(),
        })
        .collect();

        Self {
            public_prefixes: [
                "/health",
                "/metrics",
                "/unauthorized",
                "/swagger-ui",
                "/api-docs",
                "/favicon.ico",
                "/assets",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            auth_only_prefixes: [
                "/login",
                "/register",
                "/forgot-password",
                "/reset-password",
                "/verify-email",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            protected,
            default_policy,
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            root_path: "/".to_string(),
        }
    }

    pub fn classify(&self, path: &str) -> RouteClass<'_> {
        if self
            .public_prefixes
            .iter()
            .any(|p| prefix_matches(p, path))
        {
            return RouteClass::Public;
        }

        if self
            .auth_only_prefixes
            .iter()
            .any(|p| prefix_matches(p, path))
        {
            return RouteClass::AuthOnly;
        }

        // Longest matching prefix wins, so a nested rule can tighten its
        // parent subtree.
        let rule = self
            .protected
            .iter()
            .filter(|r| prefix_matches(&r.prefix, path))
            .max_by_key(|r| r.prefix.len());

        match rule {
            Some(rule) => RouteClass::Protected(&rule.permission),
            None => RouteClass::Unmatched,
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::dashboard(DefaultPolicy::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_prefixes() {
        let table = RouteTable::default();
        assert_eq!(table.classify("/health"), RouteClass::Public);
        assert_eq!(table.classify("/health/ready"), RouteClass::Public);
        assert_eq!(table.classify("/unauthorized"), RouteClass::Public);
        assert_eq!(table.classify("/swagger-ui/index.html"), RouteClass::Public);
    }

    #[test]
    fn test_auth_only_prefixes() {
        let table = RouteTable::default();
        assert_eq!(table.classify("/login"), RouteClass::AuthOnly);
        assert_eq!(table.classify("/register"), RouteClass::AuthOnly);
        assert_eq!(table.classify("/reset-password"), RouteClass::AuthOnly);
    }

    #[test]
    fn test_root_matches_exactly() {
        let table = RouteTable::default();
        assert_eq!(
            table.classify("/"),
            RouteClass::Protected(perms::DASHBOARD_VIEW)
        );
        // The root rule must not swallow every path.
        assert_eq!(table.classify("/anything-else"), RouteClass::Unmatched);
    }

    #[test]
    fn test_protected_prefix_boundaries() {
        let table = RouteTable::default();
        assert_eq!(
            table.classify("/users"),
            RouteClass::Protected(perms::USER_READ)
        );
        assert_eq!(
            table.classify("/users/42/roles"),
            RouteClass::Protected(perms::USER_READ)
        );
        assert_eq!(table.classify("/usersearch"), RouteClass::Unmatched);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = RouteTable::default();
        table.protected.push(RouteRule {
            prefix: "/users/exports".to_string(),
            permission: "audit:read".to_string(),
        });

        assert_eq!(
            table.classify("/users/exports/2024"),
            RouteClass::Protected("audit:read")
        );
        assert_eq!(
            table.classify("/users/42"),
            RouteClass::Protected(perms::USER_READ)
        );
    }

    #[test]
    fn test_default_policy_parse() {
        assert_eq!(DefaultPolicy::parse("allow"), Some(DefaultPolicy::Allow));
        assert_eq!(DefaultPolicy::parse("DENY"), Some(DefaultPolicy::Deny));
        assert_eq!(DefaultPolicy::parse("open"), None);
    }
}
