pub mod password;
pub mod validation;

pub use password::{Password, PasswordHashString, PasswordHasher};
pub use validation::ValidatedJson;
