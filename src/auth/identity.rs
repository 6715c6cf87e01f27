//! Caller identities and roles
//!
//! The administrative bypass is a role carried by the identity rather than
//! a comparison against a process-wide address constant.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{PorticoError, Result};

/// Role attached to an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    /// Passes every network authorization check
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub role: Role,
}

impl Identity {
    pub fn user(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: Role::User,
        }
    }

    pub fn admin(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails `Forbidden` unless the caller holds the admin role
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(PorticoError::Forbidden(
                "administrative privileges required".into(),
            ))
        }
    }
}
