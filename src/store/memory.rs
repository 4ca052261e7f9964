//! In-memory store implementation.
//!
//! Backs the integration test suite and local development without a running
//! Postgres. A single mutex guards all state, which makes every multi-step
//! mutation atomic with respect to concurrent readers, matching the
//! transactional guarantees of [`super::PgStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::auth::token::generate_uuid;
use crate::models::{
    EmailVerificationToken, LoginHistory, NewLoginHistory, NewPermission, NewRole, NewUser,
    PasswordResetToken, Permission, Role, RolePatch, Session, User, UserPatch,
};

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    user_roles: Vec<(Uuid, Uuid)>,
    role_permissions: Vec<(Uuid, Uuid)>,
    sessions: HashMap<String, Session>,
    login_history: Vec<LoginHistory>,
    reset_tokens: Vec<PasswordResetToken>,
    verification_tokens: Vec<EmailVerificationToken>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut inner = self.lock()?;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(StoreError::Conflict(format!(
                "duplicate email {}",
                new_user.email
            )));
        }
        let ts = now();
        let user = User {
            id: new_user.id,
            email: new_user.email,
            password_hash: new_user.password_hash,
            full_name: new_user.full_name,
            is_active: true,
            email_verified_at: None,
            created_at: ts,
            updated_at: ts,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.get(&id).cloned())
    }

    fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut inner = self.lock()?;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = patch.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(is_active) = patch.is_active {
            user.is_active = is_active;
        }
        user.updated_at = now();
        Ok(Some(user.clone()))
    }

    fn list_users(&self, limit: i64, offset: i64) -> StoreResult<(Vec<User>, i64)> {
        let inner = self.lock()?;
        let mut all: Vec<User> = inner.users.values().cloned().collect();
        all.sort_by(|a, b| a.email.cmp(&b.email));
        let total = all.len() as i64;
        Ok((page(&all, limit, offset), total))
    }

    fn replace_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.user_roles.retain(|(uid, _)| *uid != user_id);
        for role_id in role_ids {
            inner.user_roles.push((user_id, *role_id));
        }
        Ok(())
    }

    fn find_roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        let inner = self.lock()?;
        let mut result: Vec<Role> = inner
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, rid)| inner.roles.get(rid).cloned())
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn find_permission_names_for_user(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let inner = self.lock()?;
        let mut names: Vec<String> = inner
            .user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .flat_map(|(_, rid)| {
                inner
                    .role_permissions
                    .iter()
                    .filter(move |(role_id, _)| role_id == rid)
                    .filter_map(|(_, pid)| inner.permissions.get(pid).map(|p| p.name.clone()))
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn create_role(&self, new_role: NewRole, permission_ids: &[Uuid]) -> StoreResult<Role> {
        let mut inner = self.lock()?;
        if inner.roles.values().any(|r| r.name == new_role.name) {
            return Err(StoreError::Conflict(format!(
                "duplicate role {}",
                new_role.name
            )));
        }
        let role = Role {
            id: new_role.id,
            name: new_role.name,
            description: new_role.description,
            created_at: now(),
        };
        inner.roles.insert(role.id, role.clone());
        for permission_id in permission_ids {
            inner.role_permissions.push((role.id, *permission_id));
        }
        Ok(role)
    }

    fn find_role(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let inner = self.lock()?;
        Ok(inner.roles.get(&id).cloned())
    }

    fn list_roles(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Role>, i64)> {
        let inner = self.lock()?;
        let mut all: Vec<Role> = inner.roles.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        let total = all.len() as i64;
        Ok((page(&all, limit, offset), total))
    }

    fn update_role(&self, id: Uuid, patch: RolePatch) -> StoreResult<Option<Role>> {
        let mut inner = self.lock()?;
        if !inner.roles.contains_key(&id) {
            return Ok(None);
        }
        if let Some(ref name) = patch.name {
            if inner.roles.values().any(|r| r.id != id && &r.name == name) {
                return Err(StoreError::Conflict(format!("duplicate role {}", name)));
            }
        }

        if let Some(permission_ids) = patch.permission_ids {
            inner.role_permissions.retain(|(rid, _)| *rid != id);
            for permission_id in permission_ids {
                inner.role_permissions.push((id, permission_id));
            }
        }

        let role = inner.roles.get_mut(&id).expect("checked above");
        if let Some(name) = patch.name {
            role.name = name;
        }
        if let Some(description) = patch.description {
            role.description = Some(description);
        }
        Ok(Some(role.clone()))
    }

    fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let removed = inner.roles.remove(&id).is_some();
        if removed {
            inner.role_permissions.retain(|(rid, _)| *rid != id);
            inner.user_roles.retain(|(_, rid)| *rid != id);
        }
        Ok(removed)
    }

    fn list_role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<Permission>> {
        let inner = self.lock()?;
        let mut result: Vec<Permission> = inner
            .role_permissions
            .iter()
            .filter(|(rid, _)| *rid == role_id)
            .filter_map(|(_, pid)| inner.permissions.get(pid).cloned())
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn create_permission(&self, new_permission: NewPermission) -> StoreResult<Permission> {
        let mut inner = self.lock()?;
        if inner
            .permissions
            .values()
            .any(|p| p.name == new_permission.name)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate permission {}",
                new_permission.name
            )));
        }
        let permission = Permission {
            id: new_permission.id,
            name: new_permission.name,
            description: new_permission.description,
            resource: new_permission.resource,
            action: new_permission.action,
            created_at: now(),
        };
        inner.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    fn list_permissions(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Permission>, i64)> {
        let inner = self.lock()?;
        let mut all: Vec<Permission> = inner.permissions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        let total = all.len() as i64;
        Ok((page(&all, limit, offset), total))
    }

    fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let session = Session {
            id: generate_uuid(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: now(),
        };
        inner.sessions.insert(session.token_hash.clone(), session);
        Ok(())
    }

    fn find_user_by_session(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        let Some(session) = inner.sessions.get(token_hash) else {
            return Ok(None);
        };
        if session.expires_at <= now() {
            return Ok(None);
        }
        Ok(inner.users.get(&session.user_id).cloned())
    }

    fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.sessions.remove(token_hash);
        Ok(())
    }

    fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.user_id != user_id);
        Ok(before - inner.sessions.len())
    }

    fn create_login_history(&self, entry: NewLoginHistory) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let record = LoginHistory {
            id: entry.id,
            user_id: entry.user_id,
            status: entry.status,
            reason: entry.reason,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: now(),
        };
        inner.login_history.push(record);
        Ok(())
    }

    fn list_login_history(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<LoginHistory>, i64)> {
        let inner = self.lock()?;
        let mut all: Vec<LoginHistory> = inner
            .login_history
            .iter()
            .filter(|h| user_id.map_or(true, |uid| h.user_id == uid))
            .cloned()
            .collect();
        all.reverse();
        let total = all.len() as i64;
        Ok((page(&all, limit, offset), total))
    }

    fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.reset_tokens.retain(|t| t.user_id != user_id);
        let token = PasswordResetToken {
            id: generate_uuid(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used_at: None,
            created_at: now(),
        };
        inner.reset_tokens.push(token);
        Ok(())
    }

    fn consume_reset_token_and_update_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> StoreResult<Option<Uuid>> {
        let mut inner = self.lock()?;
        let ts = now();
        let Some(token) = inner
            .reset_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && t.used_at.is_none() && t.expires_at > ts)
        else {
            return Ok(None);
        };
        token.used_at = Some(ts);
        let user_id = token.user_id;

        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.password_hash = Some(new_password_hash.to_string());
        user.updated_at = ts;

        inner.sessions.retain(|_, s| s.user_id != user_id);
        Ok(Some(user_id))
    }

    fn create_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let token = EmailVerificationToken {
            id: generate_uuid(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used_at: None,
            created_at: now(),
        };
        inner.verification_tokens.push(token);
        Ok(())
    }

    fn consume_verification_token(&self, token_hash: &str) -> StoreResult<Option<Uuid>> {
        let mut inner = self.lock()?;
        let ts = now();
        let Some(token) = inner
            .verification_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && t.used_at.is_none() && t.expires_at > ts)
        else {
            return Ok(None);
        };
        token.used_at = Some(ts);
        let user_id = token.user_id;

        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.email_verified_at = Some(ts);
        user.updated_at = ts;
        Ok(Some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(email: &str) -> NewUser {
        NewUser {
            id: generate_uuid(),
            email: email.to_string(),
            password_hash: Some("hash".to_string()),
            full_name: None,
        }
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(sample_user("a@example.com")).unwrap();
        let err = store.create_user(sample_user("A@Example.com")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_expired_session_resolves_to_none() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user("b@example.com")).unwrap();
        let expired = Utc::now().naive_utc() - chrono::Duration::minutes(1);
        store.create_session(user.id, "stale", expired).unwrap();
        assert!(store.find_user_by_session("stale").unwrap().is_none());
    }

    #[test]
    fn test_reset_token_consumption_is_single_use() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user("c@example.com")).unwrap();
        let expires = Utc::now().naive_utc() + chrono::Duration::minutes(30);
        store
            .create_password_reset_token(user.id, "tok", expires)
            .unwrap();

        let first = store
            .consume_reset_token_and_update_password("tok", "new-hash")
            .unwrap();
        assert_eq!(first, Some(user.id));

        let second = store
            .consume_reset_token_and_update_password("tok", "other-hash")
            .unwrap();
        assert_eq!(second, None);

        let reloaded = store.find_user_by_id(user.id).unwrap().unwrap();
        assert_eq!(reloaded.password_hash.as_deref(), Some("new-hash"));
    }

    #[test]
    fn test_reset_consumption_purges_sessions() {
        let store = MemoryStore::new();
        let user = store.create_user(sample_user("d@example.com")).unwrap();
        let expires = Utc::now().naive_utc() + chrono::Duration::days(7);
        store.create_session(user.id, "sess", expires).unwrap();
        store
            .create_password_reset_token(user.id, "tok", expires)
            .unwrap();

        store
            .consume_reset_token_and_update_password("tok", "new-hash")
            .unwrap();
        assert!(store.find_user_by_session("sess").unwrap().is_none());
    }

    #[test]
    fn test_role_permission_sync_replaces_set() {
        let store = MemoryStore::new();
        let p1 = store
            .create_permission(NewPermission {
                id: generate_uuid(),
                name: "user:read".to_string(),
                description: None,
                resource: "user".to_string(),
                action: "read".to_string(),
            })
            .unwrap();
        let p2 = store
            .create_permission(NewPermission {
                id: generate_uuid(),
                name: "user:write".to_string(),
                description: None,
                resource: "user".to_string(),
                action: "write".to_string(),
            })
            .unwrap();

        let role = store
            .create_role(
                NewRole {
                    id: generate_uuid(),
                    name: "staff".to_string(),
                    description: None,
                },
                &[p1.id],
            )
            .unwrap();

        store
            .update_role(
                role.id,
                RolePatch {
                    permission_ids: Some(vec![p2.id]),
                    ..Default::default()
                },
            )
            .unwrap();

        let perms = store.list_role_permissions(role.id).unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].name, "user:write");
    }
}
