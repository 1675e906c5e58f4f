//! External Identity Bridge.
//!
//! Accepts identity tokens issued by the configured external provider and
//! mirrors their subjects into the user directory: first login provisions a
//! member row with no local credential, later logins sync only the profile
//! fields the token actually carries. Locally assigned roles are never
//! overwritten, and a token without an email or metadata name leaves the
//! stored profile alone.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::directory::{self, ExternalUpsert, UserRecord};
use super::errors::AuthError;
use super::principal::{Principal, Role};
use super::utils::{email_local_part, normalize_email, unix_now, valid_email};
use crate::api::handlers::{IdentityVerifier, IdentityVerifyError, verify_identity_token};

const FALLBACK_DISPLAY_NAME: &str = "User";

/// Claims the bridge consumes from a provider token. Everything else in the
/// token is ignored.
#[derive(Debug, Deserialize)]
struct ExternalClaims {
    iss: String,
    sub: String,
    exp: i64,
    email: Option<String>,
    #[serde(default)]
    user_metadata: ExternalMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalMetadata {
    full_name: Option<String>,
}

/// The identity extracted from a valid provider token. `email` and
/// `full_name` are only set when the token carried them; absent claims never
/// overwrite stored profile fields.
#[derive(Debug, PartialEq, Eq)]
struct ExternalIdentity {
    user_id: Uuid,
    email: Option<String>,
    full_name: Option<String>,
}

/// Display name for a first login: provider metadata, then the email local
/// part, then a fixed placeholder.
fn provisioned_display_name(identity: &ExternalIdentity) -> String {
    if let Some(name) = &identity.full_name {
        return name.clone();
    }
    identity
        .email
        .as_deref()
        .and_then(email_local_part)
        .map_or_else(|| FALLBACK_DISPLAY_NAME.to_string(), str::to_string)
}

/// Profile values after a repeat login: provider claims win only for the
/// fields the token actually carried, so a locally renamed user keeps their
/// name until the provider sends one.
fn synced_profile(user: &UserRecord, identity: &ExternalIdentity) -> (Option<String>, String) {
    let email = identity.email.clone().or_else(|| user.email.clone());
    let full_name = identity
        .full_name
        .clone()
        .unwrap_or_else(|| user.full_name.clone());
    (email, full_name)
}

/// Validate provider claims against the expected issuer and clock, and shape
/// them into a directory identity. The provider-assigned subject must be a
/// UUID; it becomes the local user id. An absent or blank email claim is
/// tolerated, a malformed one is not.
fn validated_identity(
    claims: &ExternalClaims,
    expected_issuer: &str,
    now_unix_seconds: i64,
) -> Result<ExternalIdentity, AuthError> {
    if claims.iss != expected_issuer {
        return Err(AuthError::InvalidExternalToken);
    }
    if claims.exp <= now_unix_seconds {
        return Err(AuthError::InvalidExternalToken);
    }
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidExternalToken)?;

    let email = match claims
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
    {
        None => None,
        Some(raw) => {
            let normalized = normalize_email(raw);
            if !valid_email(&normalized) {
                return Err(AuthError::InvalidExternalToken);
            }
            Some(normalized)
        }
    };

    let full_name = claims
        .user_metadata
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(ExternalIdentity {
        user_id,
        email,
        full_name,
    })
}

/// Verify an external identity token and return the directory principal for
/// its subject, provisioning or syncing the row as needed.
///
/// # Errors
///
/// [`AuthError::VerificationUnavailable`] when the provider keyset cannot be
/// obtained (retryable); [`AuthError::InvalidExternalToken`] for any defect
/// in the token itself; [`AuthError::DuplicateIdentity`] when the token's
/// email belongs to a different account.
pub(crate) async fn convert(
    pool: &PgPool,
    verifier: &IdentityVerifier,
    token: &str,
) -> Result<Principal, AuthError> {
    let claims = verify_identity_token(verifier, token)
        .await
        .map_err(|err| match err {
            IdentityVerifyError::Unavailable => AuthError::VerificationUnavailable,
            IdentityVerifyError::Invalid => AuthError::InvalidExternalToken,
        })?;
    let claims: ExternalClaims =
        serde_json::from_value(claims).map_err(|_| AuthError::InvalidExternalToken)?;
    let identity = validated_identity(&claims, verifier.issuer(), unix_now())?;

    upsert_principal(pool, identity).await
}

/// Create-or-sync against the directory. Stored emails are normalized, so
/// the change check is effectively case-insensitive; an unchanged profile
/// issues no UPDATE at all, which is what makes repeated logins idempotent.
async fn upsert_principal(
    pool: &PgPool,
    identity: ExternalIdentity,
) -> Result<Principal, AuthError> {
    let existing = directory::lookup_user_by_id(pool, identity.user_id).await?;

    match existing {
        Some(user) => {
            let (email, full_name) = synced_profile(&user, &identity);
            if email != user.email || full_name != user.full_name {
                match directory::sync_external_profile(
                    pool,
                    identity.user_id,
                    email.as_deref(),
                    &full_name,
                )
                .await?
                {
                    ExternalUpsert::Ready => {}
                    ExternalUpsert::EmailConflict => return Err(AuthError::DuplicateIdentity),
                }
            }
            Ok(Principal {
                user_id: identity.user_id,
                email,
                full_name,
                role: user.role,
            })
        }
        None => {
            let full_name = provisioned_display_name(&identity);
            match directory::insert_external_user(
                pool,
                identity.user_id,
                identity.email.as_deref(),
                &full_name,
            )
            .await?
            {
                ExternalUpsert::Ready => {}
                ExternalUpsert::EmailConflict => return Err(AuthError::DuplicateIdentity),
            }
            // DO NOTHING on a concurrent insert means our values may not
            // have landed; the row that won carries the role either way.
            let role = directory::lookup_user_by_id(pool, identity.user_id)
                .await?
                .map_or(Role::Member, |user| user.role);
            Ok(Principal {
                user_id: identity.user_id,
                email: identity.email,
                full_name,
                role,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://id.provider.test";
    const NOW: i64 = 1_700_000_000;
    const SUB: &str = "5f0c6f1e-0000-4000-8000-0000000000aa";

    fn claims(email: Option<&str>, full_name: Option<&str>) -> ExternalClaims {
        ExternalClaims {
            iss: ISSUER.to_string(),
            sub: SUB.to_string(),
            exp: NOW + 60,
            email: email.map(str::to_string),
            user_metadata: ExternalMetadata {
                full_name: full_name.map(str::to_string),
            },
        }
    }

    fn identity(email: Option<&str>, full_name: Option<&str>) -> ExternalIdentity {
        ExternalIdentity {
            user_id: Uuid::nil(),
            email: email.map(str::to_string),
            full_name: full_name.map(str::to_string),
        }
    }

    fn stored_user(email: Option<&str>, full_name: &str) -> UserRecord {
        UserRecord {
            id: Uuid::nil(),
            email: email.map(str::to_string),
            full_name: full_name.to_string(),
            role: Role::Member,
            password_hash: None,
        }
    }

    #[test]
    fn provisioning_name_prefers_metadata() {
        assert_eq!(
            provisioned_display_name(&identity(Some("u1@ext.com"), Some("Ada Lovelace"))),
            "Ada Lovelace"
        );
    }

    #[test]
    fn provisioning_name_falls_back_to_local_part_then_fixed() {
        assert_eq!(
            provisioned_display_name(&identity(Some("u1@ext.com"), None)),
            "u1"
        );
        assert_eq!(provisioned_display_name(&identity(None, None)), "User");
    }

    #[test]
    fn missing_email_yields_placeholder_identity() -> Result<(), AuthError> {
        let identity = validated_identity(&claims(None, None), ISSUER, NOW)?;
        assert_eq!(identity.email, None);
        assert_eq!(identity.full_name, None);
        assert_eq!(provisioned_display_name(&identity), "User");
        Ok(())
    }

    #[test]
    fn blank_email_is_treated_as_absent() -> Result<(), AuthError> {
        let identity = validated_identity(&claims(Some("   "), Some("Ada")), ISSUER, NOW)?;
        assert_eq!(identity.email, None);
        assert_eq!(identity.full_name.as_deref(), Some("Ada"));
        Ok(())
    }

    #[test]
    fn identity_extracts_subject_email_and_name() -> Result<(), AuthError> {
        let identity = validated_identity(
            &claims(Some(" U1@Ext.Com "), Some("Ada")),
            ISSUER,
            NOW,
        )?;
        assert_eq!(identity.user_id, Uuid::parse_str(SUB).map_err(|_| AuthError::Forbidden)?);
        assert_eq!(identity.email.as_deref(), Some("u1@ext.com"));
        assert_eq!(identity.full_name.as_deref(), Some("Ada"));
        Ok(())
    }

    #[test]
    fn sync_keeps_local_rename_when_token_has_no_metadata_name() {
        let user = stored_user(Some("u1@ext.com"), "Renamed Locally");
        let (email, full_name) = synced_profile(&user, &identity(Some("u1@ext.com"), None));
        assert_eq!(email.as_deref(), Some("u1@ext.com"));
        assert_eq!(full_name, "Renamed Locally");
    }

    #[test]
    fn sync_applies_metadata_name_when_present() {
        let user = stored_user(Some("u1@ext.com"), "Renamed Locally");
        let (_, full_name) = synced_profile(&user, &identity(Some("u1@ext.com"), Some("Ada")));
        assert_eq!(full_name, "Ada");
    }

    #[test]
    fn sync_keeps_stored_email_when_token_has_none() {
        let user = stored_user(Some("u1@ext.com"), "Ada");
        let (email, _) = synced_profile(&user, &identity(None, None));
        assert_eq!(email.as_deref(), Some("u1@ext.com"));
    }

    #[test]
    fn rejects_wrong_issuer() {
        let result = validated_identity(&claims(Some("u1@ext.com"), None), "https://other", NOW);
        assert!(matches!(result, Err(AuthError::InvalidExternalToken)));
    }

    #[test]
    fn rejects_expired_token() {
        let result = validated_identity(&claims(Some("u1@ext.com"), None), ISSUER, NOW + 61);
        assert!(matches!(result, Err(AuthError::InvalidExternalToken)));
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let mut bad = claims(Some("u1@ext.com"), None);
        bad.sub = "not-a-uuid".to_string();
        let result = validated_identity(&bad, ISSUER, NOW);
        assert!(matches!(result, Err(AuthError::InvalidExternalToken)));
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(matches!(
            validated_identity(&claims(Some("not-an-email"), None), ISSUER, NOW),
            Err(AuthError::InvalidExternalToken)
        ));
    }

    #[test]
    fn metadata_is_optional_in_token_json() -> anyhow::Result<()> {
        let decoded: ExternalClaims = serde_json::from_value(serde_json::json!({
            "iss": ISSUER,
            "sub": SUB,
            "exp": NOW + 60,
            "email": "u1@ext.com",
        }))?;
        assert_eq!(decoded.user_metadata.full_name, None);
        Ok(())
    }
}
