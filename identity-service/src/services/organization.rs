use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    models::{normalize_org_name, OrgWithRole, Organization, Role},
    services::{AuthorizationService, CredentialStore, OrgAction, ServiceError, StoreError},
};

/// Organization resource operations, each gated by the policy table.
///
/// Membership is always resolved before the org is loaded, so a caller who
/// is not a member cannot tell a missing org from a forbidden one.
#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn CredentialStore>,
    authz: AuthorizationService,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn CredentialStore>, authz: AuthorizationService) -> Self {
        Self { store, authz }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<OrgWithRole>, ServiceError> {
        Ok(self.store.list_organizations_for_user(user_id).await?)
    }

    pub async fn get(&self, user_id: Uuid, org_id: Uuid) -> Result<(Organization, Role), ServiceError> {
        let role = self.authz.authorize(user_id, org_id, OrgAction::Read).await?;
        let org = self
            .store
            .find_organization(org_id)
            .await?
            .ok_or(ServiceError::NotFound("Organization"))?;
        Ok((org, role))
    }

    #[instrument(skip(self, name))]
    pub async fn rename(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        name: &str,
    ) -> Result<Organization, ServiceError> {
        self.authz.authorize(user_id, org_id, OrgAction::Update).await?;
        let name = normalize_org_name(name).map_err(ServiceError::ValidationError)?;

        let org = self
            .store
            .update_organization_name(org_id, &name, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("Organization"))?;

        tracing::info!(org_id = %org.id, "Organization renamed");
        Ok(org)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, org_id: Uuid) -> Result<(), ServiceError> {
        self.authz.authorize(user_id, org_id, OrgAction::Delete).await?;

        match self.store.delete_organization(org_id).await {
            Ok(true) => {
                tracing::info!(org_id = %org_id, "Organization deleted");
                Ok(())
            }
            Ok(false) => Err(ServiceError::NotFound("Organization")),
            Err(StoreError::ForeignKeyViolation(constraint)) => {
                tracing::info!(org_id = %org_id, constraint = %constraint, "Organization has dependents");
                Err(ServiceError::HasDependents)
            }
            Err(e) => Err(ServiceError::Store(e)),
        }
    }
}
