//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{identity, tokens};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Validate the identity keyset source before parsing individual options
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let token_opts = tokens::Options::parse(matches)?;
    let identity_opts = identity::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        access_token_key_path: token_opts.key_path,
        access_token_kid: token_opts.kid,
        token_issuer: token_opts.issuer,
        access_token_ttl_seconds: token_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: token_opts.refresh_token_ttl_seconds,
        identity_jwks_url: identity_opts.jwks_url,
        identity_jwks_path: identity_opts.jwks_path,
        identity_issuer: identity_opts.issuer,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_jwks_source_required() {
        temp_env::with_vars(
            [
                ("BUGBASE_IDENTITY_JWKS_URL", None::<&str>),
                ("BUGBASE_IDENTITY_JWKS_PATH", None::<&str>),
                ("BUGBASE_IDENTITY_ISS", Some("https://id.provider.test")),
                ("BUGBASE_ACCESS_TOKEN_KEY_PATH", Some("/tmp/key.pem")),
                ("BUGBASE_TOKEN_ISSUER", Some("https://api.bugbase.test")),
                (
                    "BUGBASE_DSN",
                    Some("postgres://user@localhost:5432/bugbase"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["bugbase"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(
                        err.to_string()
                            .contains("--identity-jwks-url or --identity-jwks-path")
                    );
                }
            },
        );
    }

    #[test]
    fn server_action_from_full_args() {
        temp_env::with_vars(
            [
                ("BUGBASE_IDENTITY_JWKS_URL", None::<&str>),
                ("BUGBASE_IDENTITY_JWKS_PATH", None::<&str>),
                ("BUGBASE_ACCESS_TOKEN_TTL_SECONDS", None::<&str>),
                ("BUGBASE_REFRESH_TOKEN_TTL_SECONDS", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "bugbase",
                    "--port",
                    "9090",
                    "--dsn",
                    "postgres://user@localhost:5432/bugbase",
                    "--access-token-key-path",
                    "/tmp/key.pem",
                    "--token-issuer",
                    "https://api.bugbase.test",
                    "--identity-jwks-path",
                    "/tmp/jwks.json",
                    "--identity-issuer",
                    "https://id.provider.test",
                ]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9090);
                    assert_eq!(args.dsn, "postgres://user@localhost:5432/bugbase");
                    assert_eq!(args.access_token_key_path, "/tmp/key.pem");
                    assert_eq!(args.access_token_kid, "local");
                    assert_eq!(args.token_issuer, "https://api.bugbase.test");
                    assert_eq!(args.access_token_ttl_seconds, None);
                    assert_eq!(args.refresh_token_ttl_seconds, None);
                    assert_eq!(args.identity_jwks_url, None);
                    assert_eq!(args.identity_jwks_path.as_deref(), Some("/tmp/jwks.json"));
                    assert_eq!(args.identity_issuer, "https://id.provider.test");
                }
            },
        );
    }
}
