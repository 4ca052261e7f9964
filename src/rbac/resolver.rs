//! Effective-permission resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::store::{Store, StoreError};

/// Computes a user's effective permission set: the union of permission names
/// across all roles the user currently holds.
///
/// Results are memoized per resolver instance, keyed by user id. The route
/// guard constructs one resolver per request, so a memoized set never
/// outlives the request that computed it; a role edit is visible on the next
/// request at the latest.
pub struct PermissionResolver {
    store: Arc<dyn Store>,
    memo: HashMap<Uuid, Arc<HashSet<String>>>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            memo: HashMap::new(),
        }
    }

    /// Unknown or deleted users resolve to the empty set, not an error.
    pub fn resolve(&mut self, user_id: Uuid) -> Result<Arc<HashSet<String>>, StoreError> {
        if let Some(cached) = self.memo.get(&user_id) {
            return Ok(Arc::clone(cached));
        }

        let names = self.store.find_permission_names_for_user(user_id)?;
        let set: Arc<HashSet<String>> = Arc::new(names.into_iter().collect());
        self.memo.insert(user_id, Arc::clone(&set));
        Ok(set)
    }

    pub fn has_permission(&mut self, user_id: Uuid, permission: &str) -> Result<bool, StoreError> {
        Ok(self.resolve(user_id)?.contains(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::generate_uuid;
    use crate::models::{NewPermission, NewRole, NewUser};
    use crate::store::MemoryStore;

    fn permission(store: &MemoryStore, resource: &str, action: &str) -> Uuid {
        store
            .create_permission(NewPermission {
                id: generate_uuid(),
                name: format!("{}:{}", resource, action),
                description: None,
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .unwrap()
            .id
    }

    fn role(store: &MemoryStore, name: &str, permission_ids: &[Uuid]) -> Uuid {
        store
            .create_role(
                NewRole {
                    id: generate_uuid(),
                    name: name.to_string(),
                    description: None,
                },
                permission_ids,
            )
            .unwrap()
            .id
    }

    fn user(store: &MemoryStore, email: &str) -> Uuid {
        store
            .create_user(NewUser {
                id: generate_uuid(),
                email: email.to_string(),
                password_hash: None,
                full_name: None,
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_union_across_roles() {
        let store = Arc::new(MemoryStore::new());
        let read = permission(&store, "booking", "read");
        let write = permission(&store, "vendor", "write");
        let r1 = role(&store, "viewer", &[read]);
        let r2 = role(&store, "editor", &[write]);
        let uid = user(&store, "u@example.com");
        store.replace_user_roles(uid, &[r1, r2]).unwrap();

        let mut resolver = PermissionResolver::new(store.clone());
        let set = resolver.resolve(uid).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("booking:read"));
        assert!(set.contains("vendor:write"));

        // Dropping a role is reflected by a fresh resolver.
        store.replace_user_roles(uid, &[r1]).unwrap();
        let mut resolver = PermissionResolver::new(store.clone());
        let set = resolver.resolve(uid).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("booking:read"));
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let store = Arc::new(MemoryStore::new());
        let read = permission(&store, "booking", "read");
        let r1 = role(&store, "viewer", &[read]);
        let r2 = role(&store, "auditor", &[read]);
        let uid = user(&store, "u@example.com");
        store.replace_user_roles(uid, &[r1, r2]).unwrap();

        let mut resolver = PermissionResolver::new(store);
        assert_eq!(resolver.resolve(uid).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_user_resolves_to_empty_set() {
        let store = Arc::new(MemoryStore::new());
        let mut resolver = PermissionResolver::new(store);
        let set = resolver.resolve(generate_uuid()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_memoization_is_bounded_to_resolver_lifetime() {
        let store = Arc::new(MemoryStore::new());
        let read = permission(&store, "booking", "read");
        let r1 = role(&store, "viewer", &[read]);
        let uid = user(&store, "u@example.com");
        store.replace_user_roles(uid, &[r1]).unwrap();

        let mut resolver = PermissionResolver::new(store.clone());
        assert!(resolver.has_permission(uid, "booking:read").unwrap());

        // A mid-request role edit is not observed by the same resolver...
        store.replace_user_roles(uid, &[]).unwrap();
        assert!(resolver.has_permission(uid, "booking:read").unwrap());

        // ...but the next request's resolver sees it.
        let mut next = PermissionResolver::new(store);
        assert!(!next.has_permission(uid, "booking:read").unwrap());
    }
}
