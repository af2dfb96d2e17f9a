//! Domain models for identity-service.

mod membership;
mod organization;
mod user;

pub use membership::{Membership, Role};
pub use organization::{normalize_org_name, OrgWithRole, Organization, MAX_ORG_NAME_LEN};
pub use user::{canonical_email, User, UserResponse};
