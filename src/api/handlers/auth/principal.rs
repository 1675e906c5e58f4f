//! Authenticated principal and role-based authorization guard.
//!
//! Every protected handler resolves the caller explicitly through
//! [`require_principal`]; there is no ambient security context. Denials are
//! uniform so a rejected caller cannot tell a missing permission from a
//! missing resource.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::bridge;
use super::directory;
use super::errors::AuthError;
use super::state::AuthState;
use super::utils::unix_now;
use crate::api::handlers::IdentityVerifier;

/// Roles known to the system. Unknown role strings are rejected at parse
/// time, never mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    /// Parse a role name case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Canonical lowercase name, as stored and as carried in token claims.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Whether a caller holding `self` satisfies `required`. Admin implies
    /// member.
    #[must_use]
    pub const fn allows(self, required: Self) -> bool {
        match required {
            Self::Admin => matches!(self, Self::Admin),
            Self::Member => true,
        }
    }
}

/// The resolved caller identity handlers operate on. External accounts may
/// carry no email.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub full_name: String,
    pub role: Role,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the caller from the `Authorization` header.
///
/// The bearer token is first verified as a locally issued access token; the
/// token's role claim stays authoritative for its own lifetime, while the
/// directory row supplies the display name and confirms the account still
/// exists. Tokens that are not ours are handed to the External Identity
/// Bridge, which verifies them against the provider keyset and provisions or
/// syncs the directory row.
///
/// # Errors
///
/// Returns [`AuthError::Forbidden`] when no usable bearer token is present or
/// the local token no longer maps to a directory row; bridge failures keep
/// their own taxonomy (`InvalidExternalToken`, `VerificationUnavailable`).
pub(crate) async fn require_principal(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    verifier: &IdentityVerifier,
) -> Result<Principal, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::Forbidden)?;

    if let Ok(claims) = state.verify_access_token(token, unix_now()) {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Forbidden)?;
        let role = Role::parse(&claims.role).ok_or(AuthError::Forbidden)?;
        let user = directory::lookup_user_by_id(pool, user_id)
            .await?
            .ok_or(AuthError::Forbidden)?;
        return Ok(Principal {
            user_id,
            email: user.email,
            full_name: user.full_name,
            role,
        });
    }

    bridge::convert(pool, verifier, token).await
}

/// Enforce a role requirement with a uniform denial.
pub(crate) fn require_role(principal: &Principal, required: Role) -> Result<(), AuthError> {
    if principal.role.allows(required) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse(" member "), Some(Role::Member));
        assert_eq!(Role::parse("Member"), Some(Role::Member));
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::parse(""), None);
        assert_eq!(Role::parse("adminn"), None);
    }

    #[test]
    fn admin_implies_member() {
        assert!(Role::Admin.allows(Role::Admin));
        assert!(Role::Admin.allows(Role::Member));
        assert!(Role::Member.allows(Role::Member));
        assert!(!Role::Member.allows(Role::Admin));
    }

    #[test]
    fn role_round_trips_through_canonical_name() {
        for role in [Role::Admin, Role::Member] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn require_role_denies_uniformly() {
        let principal = Principal {
            user_id: Uuid::nil(),
            email: Some("m@example.com".to_string()),
            full_name: "M".to_string(),
            role: Role::Member,
        };
        assert!(require_role(&principal, Role::Member).is_ok());
        assert!(matches!(
            require_role(&principal, Role::Admin),
            Err(AuthError::Forbidden)
        ));
    }
}
