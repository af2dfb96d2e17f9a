use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    models::{normalize_org_name, Membership, Organization, Role},
    services::{CredentialStore, ServiceError, StoreError},
};

/// Creates an organization together with its owner membership, atomically.
#[derive(Clone)]
pub struct MembershipTransactionManager {
    store: Arc<dyn CredentialStore>,
}

impl MembershipTransactionManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Both rows become visible together or not at all. No retry.
    #[instrument(skip(self, name))]
    pub async fn create_org(&self, user_id: Uuid, name: &str) -> Result<Organization, ServiceError> {
        let name = normalize_org_name(name).map_err(ServiceError::ValidationError)?;

        let org = self
            .create_in_transaction(user_id, Organization::new(name))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Organization creation rolled back");
                ServiceError::OperationFailed(anyhow::Error::new(e))
            })?;

        tracing::info!(org_id = %org.id, "Organization created");

        Ok(org)
    }

    async fn create_in_transaction(
        &self,
        user_id: Uuid,
        org: Organization,
    ) -> Result<Organization, StoreError> {
        // Dropping `tx` on any early return rolls it back.
        let mut tx = self.store.begin().await?;
        tx.insert_organization(&org).await?;
        tx.insert_membership(&Membership::new(user_id, org.id, Role::Owner))
            .await?;
        tx.commit().await?;
        Ok(org)
    }
}
