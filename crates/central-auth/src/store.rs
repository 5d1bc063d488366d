//! Principal persistence.
//!
//! [`PrincipalStore`] is the seam to whatever database holds accounts.
//! [`InMemoryPrincipalStore`] backs tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use central_core::error::{CentralError, CentralResult};

use crate::principal::{normalize_email, Principal, PrincipalField};

/// Lookup and partial update of principals.
///
/// `save` must apply all listed fields in one atomic update: readers see
/// either every old value or every new one.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Finds a principal by normalized email.
    async fn find_by_email(&self, email: &str) -> CentralResult<Option<Principal>>;

    /// Finds a principal by id.
    async fn find_by_id(&self, id: i64) -> CentralResult<Option<Principal>>;

    /// Persists the listed fields of an existing principal.
    ///
    /// Fails with [`CentralError::NotFound`] if no principal has `principal.id`.
    async fn save(&self, principal: &Principal, fields: &[PrincipalField]) -> CentralResult<()>;
}

/// A principal store held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPrincipalStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: i64,
    principals: BTreeMap<i64, Principal>,
}

impl InMemoryPrincipalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new principal, assigning its id.
    ///
    /// Fails with [`CentralError::Conflict`] if the email is already taken.
    pub async fn insert(&self, mut principal: Principal) -> CentralResult<Principal> {
        principal.email = normalize_email(&principal.email);
        let mut inner = self.inner.write().await;
        if inner
            .principals
            .values()
            .any(|existing| existing.email == principal.email)
        {
            return Err(CentralError::Conflict(format!(
                "A principal with email '{}' already exists.",
                principal.email
            )));
        }
        inner.next_id += 1;
        principal.id = inner.next_id;
        inner.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    /// Number of stored principals.
    pub async fn len(&self) -> usize {
        self.inner.read().await.principals.len()
    }

    /// Returns `true` when the store holds no principal.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.principals.is_empty()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_email(&self, email: &str) -> CentralResult<Option<Principal>> {
        let email = normalize_email(email);
        let inner = self.inner.read().await;
        Ok(inner.principals.values().find(|p| p.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> CentralResult<Option<Principal>> {
        Ok(self.inner.read().await.principals.get(&id).cloned())
    }

    async fn save(&self, principal: &Principal, fields: &[PrincipalField]) -> CentralResult<()> {
        let mut inner = self.inner.write().await;
        if fields.contains(&PrincipalField::Email) {
            let email = normalize_email(&principal.email);
            if inner
                .principals
                .values()
                .any(|p| p.id != principal.id && p.email == email)
            {
                return Err(CentralError::Conflict(format!(
                    "A principal with email '{email}' already exists."
                )));
            }
        }
        let stored = inner
            .principals
            .get_mut(&principal.id)
            .ok_or_else(|| CentralError::NotFound(format!("principal {}", principal.id)))?;

        for field in fields {
            match field {
                PrincipalField::Email => stored.email = normalize_email(&principal.email),
                PrincipalField::FirstName => stored.first_name.clone_from(&principal.first_name),
                PrincipalField::LastName => stored.last_name.clone_from(&principal.last_name),
                PrincipalField::Password => stored.password.clone_from(&principal.password),
                PrincipalField::IsActive => stored.is_active = principal.is_active,
                PrincipalField::LastLogin => stored.last_login = principal.last_login,
                PrincipalField::LastPasswordChange => {
                    stored.last_password_change = principal.last_password_change;
                }
            }
        }
        Ok(())
    }
}
