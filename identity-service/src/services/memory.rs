//! In-memory credential store with the same constraint semantics as the
//! PostgreSQL schema: unique emails, unique (user, org) memberships, foreign
//! keys from memberships to users and orgs, and all-or-nothing transactions.
//!
//! Used by the test suites; faults can be injected to exercise rollback paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Membership, OrgWithRole, Organization, Role, User};
use crate::services::store::{CredentialStore, StoreError, StoreTransaction};

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, User>,
    user_ids_by_email: HashMap<String, Uuid>,
    orgs: HashMap<Uuid, Organization>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    /// Orgs referenced by rows outside this store.
    orgs_with_dependents: HashSet<Uuid>,
}

impl MockState {
    fn check_membership(
        &self,
        membership: &Membership,
        pending_orgs: &[Organization],
        pending_memberships: &[Membership],
    ) -> Result<(), StoreError> {
        if !self.users.contains_key(&membership.user_id) {
            return Err(StoreError::ForeignKeyViolation(
                "memberships_user_id_fkey".to_string(),
            ));
        }
        let org_known = self.orgs.contains_key(&membership.org_id)
            || pending_orgs.iter().any(|o| o.id == membership.org_id);
        if !org_known {
            return Err(StoreError::ForeignKeyViolation(
                "memberships_org_id_fkey".to_string(),
            ));
        }
        let key = (membership.user_id, membership.org_id);
        let duplicate = self.memberships.contains_key(&key)
            || pending_memberships
                .iter()
                .any(|m| (m.user_id, m.org_id) == key);
        if duplicate {
            return Err(StoreError::UniqueViolation("memberships_pkey".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct MockInner {
    state: Mutex<MockState>,
    fail_membership_insert: AtomicBool,
    fail_commit: AtomicBool,
    rollbacks: AtomicUsize,
}

impl MockInner {
    fn state(&self) -> Result<MutexGuard<'_, MockState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Mock store mutex poisoned: {}", e)))
    }
}

#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<MockInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every membership insert inside a transaction fail.
    pub fn fail_membership_inserts(&self, fail: bool) {
        self.inner
            .fail_membership_insert
            .store(fail, Ordering::SeqCst);
    }

    /// Make every transaction commit fail.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Simulate another subsystem holding references to the org.
    pub fn mark_has_dependents(&self, org_id: Uuid) -> Result<(), StoreError> {
        self.inner.state()?.orgs_with_dependents.insert(org_id);
        Ok(())
    }

    pub fn organization_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.state()?.orgs.len())
    }

    pub fn membership_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.state()?.memberships.len())
    }

    pub fn user_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.state()?.users.len())
    }

    /// Transactions that ended without a successful commit.
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MockStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.state().map(|_| ())
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.inner.state()?;
        if state.user_ids_by_email.contains_key(&user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        if state.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        state.user_ids_by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.inner.state()?;
        Ok(state
            .user_ids_by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.state()?.users.get(&user_id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MockTransaction {
            inner: Arc::clone(&self.inner),
            orgs: Vec::new(),
            memberships: Vec::new(),
            finished: false,
        }))
    }

    async fn find_membership_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<Role>, StoreError> {
        Ok(self
            .inner
            .state()?
            .memberships
            .get(&(user_id, org_id))
            .map(|m| m.role))
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        let mut state = self.inner.state()?;
        state.check_membership(membership, &[], &[])?;
        state
            .memberships
            .insert((membership.user_id, membership.org_id), membership.clone());
        Ok(())
    }

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError> {
        Ok(self.inner.state()?.orgs.get(&org_id).cloned())
    }

    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgWithRole>, StoreError> {
        let state = self.inner.state()?;
        let mut orgs: Vec<OrgWithRole> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                state
                    .orgs
                    .get(&m.org_id)
                    .map(|org| OrgWithRole::new(org.clone(), m.role))
            })
            .collect();
        orgs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orgs)
    }

    async fn update_organization_name(
        &self,
        org_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Organization>, StoreError> {
        let mut state = self.inner.state()?;
        Ok(state.orgs.get_mut(&org_id).map(|org| {
            org.name = name.to_string();
            org.updated_at = updated_at;
            org.clone()
        }))
    }

    async fn delete_organization(&self, org_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.inner.state()?;
        if state.orgs_with_dependents.contains(&org_id) {
            return Err(StoreError::ForeignKeyViolation(
                "org_dependents_org_id_fkey".to_string(),
            ));
        }
        if state.orgs.remove(&org_id).is_none() {
            return Ok(false);
        }
        state.memberships.retain(|(_, o), _| *o != org_id);
        Ok(true)
    }
}

/// Buffers writes and applies them under a single lock on commit.
struct MockTransaction {
    inner: Arc<MockInner>,
    orgs: Vec<Organization>,
    memberships: Vec<Membership>,
    finished: bool,
}

#[async_trait]
impl StoreTransaction for MockTransaction {
    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError> {
        let state = self.inner.state()?;
        if state.orgs.contains_key(&org.id) || self.orgs.iter().any(|o| o.id == org.id) {
            return Err(StoreError::UniqueViolation("orgs_pkey".to_string()));
        }
        drop(state);
        self.orgs.push(org.clone());
        Ok(())
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        if self.inner.fail_membership_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected membership insert failure"
            )));
        }
        self.inner
            .state()?
            .check_membership(membership, &self.orgs, &self.memberships)?;
        self.memberships.push(membership.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        if this.inner.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("injected commit failure")));
        }

        let inner = Arc::clone(&this.inner);
        let mut state = inner.state()?;

        // Constraints are re-checked against writes committed since they were buffered.
        if this.orgs.iter().any(|o| state.orgs.contains_key(&o.id)) {
            return Err(StoreError::UniqueViolation("orgs_pkey".to_string()));
        }
        for (i, membership) in this.memberships.iter().enumerate() {
            state.check_membership(membership, &this.orgs, &this.memberships[..i])?;
        }

        for org in this.orgs.drain(..) {
            state.orgs.insert(org.id, org);
        }
        for membership in this.memberships.drain(..) {
            state
                .memberships
                .insert((membership.user_id, membership.org_id), membership);
        }
        this.finished = true;
        Ok(())
    }
}

impl Drop for MockTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }
}
