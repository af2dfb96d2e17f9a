//! Services layer for identity-service.
//!
//! Business logic for registration, sessions, organizations and role checks,
//! over a narrow store interface.

mod authorization;
mod database;
pub mod error;
mod identity;
mod jwt;
mod membership;
mod memory;
pub mod metrics;
mod organization;
pub mod store;

pub use authorization::{AuthorizationService, OrgAction};
pub use database::Database;
pub use error::{ServiceError, TokenError};
pub use identity::{IdentityService, Session, MIN_PASSWORD_CHARS};
pub use jwt::{JwtService, SessionClaims, TokenResponse};
pub use membership::MembershipTransactionManager;
pub use memory::MockStore;
pub use organization::OrganizationService;
pub use store::{CredentialStore, StoreError, StoreTransaction};
