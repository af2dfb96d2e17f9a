use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::Role,
    services::{metrics::record_authz_decision, CredentialStore, ServiceError},
};

/// Operations on a single organization that require a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgAction {
    Read,
    Update,
    Delete,
}

impl OrgAction {
    /// Policy table: the least role allowed to perform the action.
    pub fn min_role(self) -> Role {
        match self {
            OrgAction::Read => Role::Viewer,
            OrgAction::Update => Role::Admin,
            OrgAction::Delete => Role::Owner,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrgAction::Read => "read",
            OrgAction::Update => "update",
            OrgAction::Delete => "delete",
        }
    }
}

/// Stateless role checks over the membership relation.
#[derive(Clone)]
pub struct AuthorizationService {
    store: Arc<dyn CredentialStore>,
}

impl AuthorizationService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn role_of(&self, user_id: Uuid, org_id: Uuid) -> Result<Role, ServiceError> {
        self.store
            .find_membership_role(user_id, org_id)
            .await?
            .ok_or(ServiceError::NoMembership)
    }

    /// Returns the caller's role when it is at least `min_role`.
    pub async fn require_min_role(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        min_role: Role,
    ) -> Result<Role, ServiceError> {
        let role = self.role_of(user_id, org_id).await?;
        if !role.satisfies(min_role) {
            return Err(ServiceError::InsufficientRole {
                required: min_role,
                actual: role,
            });
        }
        Ok(role)
    }

    /// `require_min_role` for a policy action, with the decision logged and counted.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        action: OrgAction,
    ) -> Result<Role, ServiceError> {
        let result = self
            .require_min_role(user_id, org_id, action.min_role())
            .await;

        match &result {
            Ok(_) => record_authz_decision(action.as_str(), true),
            Err(ServiceError::NoMembership) | Err(ServiceError::InsufficientRole { .. }) => {
                record_authz_decision(action.as_str(), false);
                tracing::info!(
                    user_id = %user_id,
                    org_id = %org_id,
                    action = action.as_str(),
                    "Access denied"
                );
            }
            Err(_) => {}
        }

        result
    }
}
