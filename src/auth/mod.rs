//! Authentication for Portico
//!
//! Provides:
//! - Caller identities with an explicit admin role
//! - JWT session tokens carrying address and role
//! - Password hashing with Argon2

pub mod identity;
pub mod jwt;
pub mod password;

pub use identity::{Identity, Role};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};
pub use password::{hash_password, verify_password};
