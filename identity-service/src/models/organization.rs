//! Organization model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Role;

pub const MAX_ORG_NAME_LEN: usize = 255;

/// Organization entity.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Create a new organization. `name` must already be validated.
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An organization as seen by one member: the org plus that member's role.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrgWithRole {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub role: Role,
}

impl OrgWithRole {
    pub fn new(org: Organization, role: Role) -> Self {
        Self {
            id: org.id,
            name: org.name,
            created_at: org.created_at,
            updated_at: org.updated_at,
            role,
        }
    }
}

/// Trim and bound-check an organization name.
pub fn normalize_org_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Organization name must not be empty".to_string());
    }
    if name.chars().count() > MAX_ORG_NAME_LEN {
        return Err(format!(
            "Organization name must be at most {} characters",
            MAX_ORG_NAME_LEN
        ));
    }
    Ok(name.to_string())
}
