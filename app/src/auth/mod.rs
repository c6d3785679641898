//! Bearer-token authentication and permission checks.
//!
//! Tokens are issued by an external identity provider; we only verify them
//! against its published keys and read the `permissions` claim.

use std::collections::BTreeSet;

use err_derive::Error;

mod guard;
mod jwks;
mod token;

pub use self::guard::{
    require_permission, Authorized, DeleteDrinks, GetDrinksDetail, PatchDrinks, Permission,
    PostDrinks,
};
pub use self::jwks::{Jwk, Jwks, KeySet};
pub use self::token::{bearer_token, TokenVerifier};

/// A failed authentication or authorization check. `code` and `description`
/// are shown to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "{} ({}): {}", code, status, description)]
pub struct AuthError {
    pub code: &'static str,
    pub description: &'static str,
    pub status: u16,
}

/// What a verified token says about its bearer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthContext {
    pub subject: Option<String>,
    pub permissions: BTreeSet<String>,
}

impl AuthError {
    fn new(code: &'static str, description: &'static str, status: u16) -> Self {
        AuthError {
            code,
            description,
            status,
        }
    }

    pub fn invalid_header(description: &'static str) -> Self {
        Self::new("invalid_header", description, 401)
    }

    pub fn token_expired() -> Self {
        Self::new("token_expired", "Token expired.", 401)
    }

    pub fn invalid_claims() -> Self {
        Self::new(
            "invalid_claims",
            "Incorrect claims. Please, check the audience and issuer.",
            401,
        )
    }

    pub fn missing_permissions() -> Self {
        Self::new("invalid_claims", "Permissions not included in JWT.", 400)
    }

    pub fn unauthorized() -> Self {
        Self::new("unauthorized", "Permission not found.", 403)
    }
}

impl AuthContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
