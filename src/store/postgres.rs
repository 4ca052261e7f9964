//! Diesel-backed store implementation.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::auth::token::generate_uuid;
use crate::models::{
    LoginHistory, NewEmailVerificationToken, NewLoginHistory, NewPasswordResetToken,
    NewPermission, NewRole, NewSession, NewUser, Permission, Role, RolePatch, User, UserPatch,
};
use crate::schema::{
    email_verification_tokens, login_history, password_reset_tokens, permissions,
    role_permissions, roles, sessions, user_roles, users,
};
use crate::DbPool;

use super::{Store, StoreError, StoreResult};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

type PgConn =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<PgConn> {
        self.pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn map_diesel_error(e: diesel::result::Error) -> StoreError {
    match e {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

impl Store for PgStore {
    fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&new_user)
            .get_result(&mut conn)
            .map_err(map_diesel_error)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .optional()
            .map_err(map_diesel_error)
    }

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        users::table
            .filter(users::id.eq(id))
            .select(User::as_select())
            .first(&mut conn)
            .optional()
            .map_err(map_diesel_error)
    }

    fn update_user(&self, id: Uuid, patch: UserPatch) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(full_name) = patch.full_name {
                diesel::update(users::table.filter(users::id.eq(id)))
                    .set(users::full_name.eq(full_name))
                    .execute(conn)?;
            }
            if let Some(is_active) = patch.is_active {
                diesel::update(users::table.filter(users::id.eq(id)))
                    .set(users::is_active.eq(is_active))
                    .execute(conn)?;
            }
            diesel::update(users::table.filter(users::id.eq(id)))
                .set(users::updated_at.eq(now))
                .execute(conn)?;

            users::table
                .filter(users::id.eq(id))
                .select(User::as_select())
                .first(conn)
                .optional()
        })
        .map_err(map_diesel_error)
    }

    fn list_users(&self, limit: i64, offset: i64) -> StoreResult<(Vec<User>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = users::table
            .count()
            .get_result(&mut conn)
            .map_err(map_diesel_error)?;
        let data = users::table
            .order(users::email.asc())
            .limit(limit)
            .offset(offset)
            .select(User::as_select())
            .load(&mut conn)
            .map_err(map_diesel_error)?;
        Ok((data, total))
    }

    fn replace_user_roles(&self, user_id: Uuid, role_ids: &[Uuid]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(user_roles::table.filter(user_roles::user_id.eq(user_id)))
                .execute(conn)?;

            if !role_ids.is_empty() {
                let rows: Vec<_> = role_ids
                    .iter()
                    .map(|role_id| {
                        (
                            user_roles::user_id.eq(user_id),
                            user_roles::role_id.eq(*role_id),
                        )
                    })
                    .collect();
                diesel::insert_into(user_roles::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            Ok(())
        })
        .map_err(map_diesel_error)
    }

    fn find_roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn()?;
        user_roles::table
            .inner_join(roles::table.on(roles::id.eq(user_roles::role_id)))
            .filter(user_roles::user_id.eq(user_id))
            .order(roles::name.asc())
            .select(Role::as_select())
            .load(&mut conn)
            .map_err(map_diesel_error)
    }

    fn find_permission_names_for_user(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let mut conn = self.conn()?;
        user_roles::table
            .inner_join(roles::table.on(roles::id.eq(user_roles::role_id)))
            .inner_join(role_permissions::table.on(role_permissions::role_id.eq(roles::id)))
            .inner_join(permissions::table.on(permissions::id.eq(role_permissions::permission_id)))
            .filter(user_roles::user_id.eq(user_id))
            .select(permissions::name)
            .distinct()
            .load(&mut conn)
            .map_err(map_diesel_error)
    }

    fn create_role(&self, new_role: NewRole, permission_ids: &[Uuid]) -> StoreResult<Role> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let role: Role = diesel::insert_into(roles::table)
                .values(&new_role)
                .get_result(conn)?;

            if !permission_ids.is_empty() {
                let rows: Vec<_> = permission_ids
                    .iter()
                    .map(|permission_id| {
                        (
                            role_permissions::role_id.eq(role.id),
                            role_permissions::permission_id.eq(*permission_id),
                        )
                    })
                    .collect();
                diesel::insert_into(role_permissions::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            Ok(role)
        })
        .map_err(map_diesel_error)
    }

    fn find_role(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let mut conn = self.conn()?;
        roles::table
            .filter(roles::id.eq(id))
            .select(Role::as_select())
            .first(&mut conn)
            .optional()
            .map_err(map_diesel_error)
    }

    fn list_roles(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Role>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = roles::table
            .count()
            .get_result(&mut conn)
            .map_err(map_diesel_error)?;
        let data = roles::table
            .order(roles::name.asc())
            .limit(limit)
            .offset(offset)
            .select(Role::as_select())
            .load(&mut conn)
            .map_err(map_diesel_error)?;
        Ok((data, total))
    }

    fn update_role(&self, id: Uuid, patch: RolePatch) -> StoreResult<Option<Role>> {
        let mut conn = self.conn()?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let existing: Option<Role> = roles::table
                .filter(roles::id.eq(id))
                .select(Role::as_select())
                .first(conn)
                .optional()?;
            if existing.is_none() {
                return Ok(None);
            }

            if let Some(name) = patch.name {
                diesel::update(roles::table.filter(roles::id.eq(id)))
                    .set(roles::name.eq(name))
                    .execute(conn)?;
            }
            if let Some(description) = patch.description {
                diesel::update(roles::table.filter(roles::id.eq(id)))
                    .set(roles::description.eq(description))
                    .execute(conn)?;
            }

            // Permission sync replaces the whole set: delete then reinsert,
            // inside this transaction.
            if let Some(permission_ids) = patch.permission_ids {
                diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(id)))
                    .execute(conn)?;
                if !permission_ids.is_empty() {
                    let rows: Vec<_> = permission_ids
                        .iter()
                        .map(|permission_id| {
                            (
                                role_permissions::role_id.eq(id),
                                role_permissions::permission_id.eq(*permission_id),
                            )
                        })
                        .collect();
                    diesel::insert_into(role_permissions::table)
                        .values(&rows)
                        .execute(conn)?;
                }
            }

            roles::table
                .filter(roles::id.eq(id))
                .select(Role::as_select())
                .first(conn)
                .optional()
        })
        .map_err(map_diesel_error)
    }

    fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(roles::table.filter(roles::id.eq(id)))
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    fn list_role_permissions(&self, role_id: Uuid) -> StoreResult<Vec<Permission>> {
        let mut conn = self.conn()?;
        role_permissions::table
            .inner_join(permissions::table.on(permissions::id.eq(role_permissions::permission_id)))
            .filter(role_permissions::role_id.eq(role_id))
            .order(permissions::name.asc())
            .select(Permission::as_select())
            .load(&mut conn)
            .map_err(map_diesel_error)
    }

    fn create_permission(&self, new_permission: NewPermission) -> StoreResult<Permission> {
        let mut conn = self.conn()?;
        diesel::insert_into(permissions::table)
            .values(&new_permission)
            .get_result(&mut conn)
            .map_err(map_diesel_error)
    }

    fn list_permissions(&self, limit: i64, offset: i64) -> StoreResult<(Vec<Permission>, i64)> {
        let mut conn = self.conn()?;
        let total: i64 = permissions::table
            .count()
            .get_result(&mut conn)
            .map_err(map_diesel_error)?;
        let data = permissions::table
            .order(permissions::name.asc())
            .limit(limit)
            .offset(offset)
            .select(Permission::as_select())
            .load(&mut conn)
            .map_err(map_diesel_error)?;
        Ok((data, total))
    }

    fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(sessions::table)
            .values(&NewSession {
                id: generate_uuid(),
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
            })
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn find_user_by_session(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        sessions::table
            .inner_join(users::table.on(users::id.eq(sessions::user_id)))
            .filter(sessions::token_hash.eq(token_hash))
            .filter(sessions::expires_at.gt(now))
            .select(User::as_select())
            .first(&mut conn)
            .optional()
            .map_err(map_diesel_error)
    }

    fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::delete(sessions::table.filter(sessions::token_hash.eq(token_hash)))
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn delete_sessions_for_user(&self, user_id: Uuid) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        diesel::delete(sessions::table.filter(sessions::user_id.eq(user_id)))
            .execute(&mut conn)
            .map_err(map_diesel_error)
    }

    fn create_login_history(&self, entry: NewLoginHistory) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(login_history::table)
            .values(&entry)
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn list_login_history(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<LoginHistory>, i64)> {
        let mut conn = self.conn()?;

        let total: i64 = match user_id {
            Some(uid) => login_history::table
                .filter(login_history::user_id.eq(uid))
                .count()
                .get_result(&mut conn),
            None => login_history::table.count().get_result(&mut conn),
        }
        .map_err(map_diesel_error)?;

        let mut data_query = login_history::table
            .select(LoginHistory::as_select())
            .into_boxed();
        if let Some(uid) = user_id {
            data_query = data_query.filter(login_history::user_id.eq(uid));
        }

        let data = data_query
            .order(login_history::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .map_err(map_diesel_error)?;
        Ok((data, total))
    }

    fn create_password_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        // A new request invalidates any outstanding token for the user.
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                password_reset_tokens::table.filter(password_reset_tokens::user_id.eq(user_id)),
            )
            .execute(conn)?;
            diesel::insert_into(password_reset_tokens::table)
                .values(&NewPasswordResetToken {
                    id: generate_uuid(),
                    user_id,
                    token_hash: token_hash.to_string(),
                    expires_at,
                })
                .execute(conn)?;
            Ok(())
        })
        .map_err(map_diesel_error)
    }

    fn consume_reset_token_and_update_password(
        &self,
        token_hash: &str,
        new_password_hash: &str,
    ) -> StoreResult<Option<Uuid>> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let token: Option<(Uuid, Uuid)> = password_reset_tokens::table
                .filter(password_reset_tokens::token_hash.eq(token_hash))
                .filter(password_reset_tokens::expires_at.gt(now))
                .filter(password_reset_tokens::used_at.is_null())
                .select((password_reset_tokens::id, password_reset_tokens::user_id))
                .first(conn)
                .optional()?;

            let Some((token_id, user_id)) = token else {
                return Ok(None);
            };

            diesel::update(
                password_reset_tokens::table.filter(password_reset_tokens::id.eq(token_id)),
            )
            .set(password_reset_tokens::used_at.eq(Some(now)))
            .execute(conn)?;

            diesel::update(users::table.filter(users::id.eq(user_id)))
                .set((
                    users::password_hash.eq(Some(new_password_hash.to_string())),
                    users::updated_at.eq(now),
                ))
                .execute(conn)?;

            diesel::delete(sessions::table.filter(sessions::user_id.eq(user_id)))
                .execute(conn)?;

            Ok(Some(user_id))
        })
        .map_err(map_diesel_error)
    }

    fn create_verification_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: NaiveDateTime,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(email_verification_tokens::table)
            .values(&NewEmailVerificationToken {
                id: generate_uuid(),
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
            })
            .execute(&mut conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }

    fn consume_verification_token(&self, token_hash: &str) -> StoreResult<Option<Uuid>> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let token: Option<(Uuid, Uuid)> = email_verification_tokens::table
                .filter(email_verification_tokens::token_hash.eq(token_hash))
                .filter(email_verification_tokens::expires_at.gt(now))
                .filter(email_verification_tokens::used_at.is_null())
                .select((
                    email_verification_tokens::id,
                    email_verification_tokens::user_id,
                ))
                .first(conn)
                .optional()?;

            let Some((token_id, user_id)) = token else {
                return Ok(None);
            };

            diesel::update(
                email_verification_tokens::table
                    .filter(email_verification_tokens::id.eq(token_id)),
            )
            .set(email_verification_tokens::used_at.eq(Some(now)))
            .execute(conn)?;

            diesel::update(users::table.filter(users::id.eq(user_id)))
                .set((
                    users::email_verified_at.eq(Some(now)),
                    users::updated_at.eq(now),
                ))
                .execute(conn)?;

            Ok(Some(user_id))
        })
        .map_err(map_diesel_error)
    }
}
