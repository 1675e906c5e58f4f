//! Auth configuration and shared token-issuing state.

use uuid::Uuid;

use super::principal::Role;
use crate::token::{AccessTokenClaims, Error as TokenError, Jwks, TokenSigner};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(issuer: String) -> Self {
        Self {
            issuer,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(super) fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub(super) fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }
}

/// Shared auth state: the access-token signing key, its derived public JWKS,
/// and the issuing configuration. Built once at startup, handed to handlers
/// behind an `Arc` extension.
pub struct AuthState {
    config: AuthConfig,
    signer: TokenSigner,
    local_jwks: Jwks,
}

impl AuthState {
    /// Parse the RS256 private key once and derive the verification JWKS
    /// from it, so issued tokens are always verifiable locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the private key cannot be decoded.
    pub fn from_private_key(
        config: AuthConfig,
        private_key_pem_or_der: &[u8],
        kid: &str,
    ) -> Result<Self, TokenError> {
        let signer = TokenSigner::from_pem_or_der(private_key_pem_or_der, kid)?;
        let local_jwks = Jwks::from_rsa_private_key_pem_or_der(private_key_pem_or_der, kid)?;
        Ok(Self {
            config,
            signer,
            local_jwks,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn local_jwks(&self) -> &Jwks {
        &self.local_jwks
    }

    /// Mint a signed access token for the given identity at `now`.
    pub(super) fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
        now_unix_seconds: i64,
    ) -> Result<String, TokenError> {
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            iat: now_unix_seconds,
            exp: now_unix_seconds + self.config.access_token_ttl_seconds,
        };
        self.signer.sign(&claims)
    }

    /// Verify a bearer token as a locally issued access token.
    pub(super) fn verify_access_token(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> Result<AccessTokenClaims, TokenError> {
        AccessTokenClaims::verify(token, &self.local_jwks, &self.config.issuer, now_unix_seconds)
    }
}
