//! Persistence interface.
//!
//! The rest of the crate only talks to the relational store through the
//! [`Store`] trait. `PgStore` backs production; `MemoryStore` backs tests and
//! local development.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::models::{
    LoginHistory, NewLoginHistory, NewPermission, NewRole, NewUser, Permission, Role, RolePatch,
    User, UserPatch,
};

#[derive(Debug)]
pub enum StoreError {
    /// Connection or pool failure.
    Unavailable(String),
    /// Unique constraint violation.
    Conflict(String),
    Query(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            StoreError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            StoreError::Query(msg) => write!(f, "Query failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow relational interface the auth/RBAC core depends on.
///
/// Multi-step mutations (`update_role`, `replace_user_roles`, the two
/// `consume_*` operations) must be atomic: a concurrent reader sees either
/// the fully-old or the fully-new state, never a partial write.
pub trait Store: Send + Sync {
    fn ping(&self) -> StoreResult<()>;

    // Users
    fn create_user(&self, new_user: NewUser) -> StoreResult<User>;
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>>;
    fn list_users(&self, limit: i64, offset: i64) -> StoreResult<(Vec<User>, i64)>;

    // Role membership and effective permissions
    fn replace_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()>;
    fn find_roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>>;
    fn find_permission_names_for_user(&self, user_id: Uuid) -> StoreResult<Vec<String>>;

    // Roles
    fn create_role(&self, new_role: NewRole, permission_ids: &[Uuid]) -> StoreResult<Role>;
    fn find_role(&self, id: Uuid) -> StoreResult<Option<Role>>;
    fn list_roles(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Role>, i64)>;
    fn update_role(&self, id: Uuid, patch: RolePatch) -> StoreResult<Option<Role>>;
    fn delete_role(&self, id: Uuid) -> StoreResult<bool>;
    fn list_role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<Permission>>;

    // Permissions (seeded reference data)
    fn create_permission(&self, new_permission: NewPermission) -> StoreResult<Permission>;
    fn list_permissions(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Permission>, i64)>;

    // Sessions
    fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()>;
    fn find_user_by_session(&self, token_hash: &str) -> StoreResult<Option<User>>;
    fn delete_session(&self, token_hash: &str) -> StoreResult<()>;
    fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<usize>;

    // Login history (append-only)
    fn create_login_history(&self, entry: NewLoginHistory) -> StoreResult<()>;
    fn list_login_history(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<LoginHistory>, i64)>;

    // Single-use tokens
    fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()>;
    /// Consumes a valid reset token and applies the new password hash in one
    /// transaction, purging the user's sessions. Returns the affected user id,
    /// or `None` when the token is unknown, expired, or already used.
    fn consume_reset_token_and_update_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> StoreResult<Option<Uuid>>;
    fn create_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()>;
    /// Consumes a valid verification token and stamps `email_verified_at` in
    /// one transaction. Returns the affected user id, or `None` when the token
    /// is unknown, expired, or already used.
    fn consume_verification_token(&self, token_hash: &str) -> StoreResult<Option<Uuid>>;
}
