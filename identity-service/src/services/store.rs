//! Narrow interface to the relational store.
//!
//! The core never enforces cross-row invariants in process: email uniqueness
//! and atomic org creation are delegated to the store through unique
//! constraints and [`StoreTransaction`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Membership, OrgWithRole, Organization, Role, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(constraint);
            }
        }
        StoreError::Backend(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Insert a user. A duplicate email fails with `UniqueViolation`.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Lookup by canonical email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Open a scoped transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn find_membership_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> Result<Option<Role>, StoreError>;

    /// Grant a role outside org creation. A second role for the same
    /// (user, org) fails with `UniqueViolation`.
    async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError>;

    async fn find_organization(&self, org_id: Uuid) -> Result<Option<Organization>, StoreError>;

    /// Organizations the user belongs to, with their role, newest first.
    async fn list_organizations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrgWithRole>, StoreError>;

    /// Returns the updated row, or `None` if the org no longer exists.
    async fn update_organization_name(
        &self,
        org_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Organization>, StoreError>;

    /// Delete an org and its memberships. Returns whether a row was removed;
    /// rows in other subsystems referencing the org fail the delete with
    /// `ForeignKeyViolation`.
    async fn delete_organization(&self, org_id: Uuid) -> Result<bool, StoreError>;
}

/// A unit of work whose writes become visible together on `commit`, or not
/// at all. There is no explicit rollback: dropping an uncommitted
/// transaction discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_organization(&mut self, org: &Organization) -> Result<(), StoreError>;

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
