use crate::{
    api,
    api::handlers::{
        IdentityVerifier,
        auth::{AuthConfig, AuthState},
    },
    token::Jwks,
};
use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretBox};
use std::{fs, sync::Arc};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_token_key_path: String,
    pub access_token_kid: String,
    pub token_issuer: String,
    pub access_token_ttl_seconds: Option<i64>,
    pub refresh_token_ttl_seconds: Option<i64>,
    pub identity_jwks_url: Option<String>,
    pub identity_jwks_path: Option<String>,
    pub identity_issuer: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key or identity keyset cannot be loaded, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // The private key only lives here long enough to derive the signer and JWKS.
    let signing_key: SecretBox<Vec<u8>> = SecretBox::new(Box::new(
        fs::read(&args.access_token_key_path).with_context(|| {
            format!(
                "Failed to read signing key: {}",
                args.access_token_key_path
            )
        })?,
    ));

    let mut auth_config = AuthConfig::new(args.token_issuer);
    if let Some(seconds) = args.access_token_ttl_seconds {
        auth_config = auth_config.with_access_token_ttl_seconds(seconds);
    }
    if let Some(seconds) = args.refresh_token_ttl_seconds {
        auth_config = auth_config.with_refresh_token_ttl_seconds(seconds);
    }

    let auth_state = Arc::new(
        AuthState::from_private_key(
            auth_config,
            signing_key.expose_secret(),
            &args.access_token_kid,
        )
        .context("Invalid access-token signing key")?,
    );

    let verifier = if let Some(url) = &args.identity_jwks_url {
        Arc::new(IdentityVerifier::new_remote(url.clone(), args.identity_issuer).await?)
    } else {
        let keyset_json = if let Some(path) = &args.identity_jwks_path {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read JWKS file: {path}"))?
        } else {
            return Err(anyhow!("Identity JWKS keyset is required"));
        };

        let keyset = Jwks::from_json(&keyset_json).context("Invalid identity JWKS JSON")?;
        keyset.validate().context("Invalid identity JWKS keyset")?;
        Arc::new(IdentityVerifier::new(keyset, args.identity_issuer))
    };

    debug!(
        port = args.port,
        kid = %args.access_token_kid,
        "starting server"
    );

    api::new(args.port, args.dsn, auth_state, verifier).await
}
