use clap::{Arg, ArgMatches, Command};

pub const ARG_ACCESS_TOKEN_KEY_PATH: &str = "access-token-key-path";
pub const ARG_ACCESS_TOKEN_KID: &str = "access-token-kid";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub key_path: String,
    pub kid: String,
    pub issuer: String,
    pub access_token_ttl_seconds: Option<i64>,
    pub refresh_token_ttl_seconds: Option<i64>,
}

impl Options {
    /// Parse token-issuing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let key_path = match get_non_empty(ARG_ACCESS_TOKEN_KEY_PATH) {
            Some(value) => value,
            None => anyhow::bail!("missing required argument: --{ARG_ACCESS_TOKEN_KEY_PATH}"),
        };

        let issuer = match get_non_empty(ARG_TOKEN_ISSUER) {
            Some(value) => value,
            None => anyhow::bail!("missing required argument: --{ARG_TOKEN_ISSUER}"),
        };

        let kid = get_non_empty(ARG_ACCESS_TOKEN_KID).unwrap_or_else(|| "local".to_string());

        Ok(Self {
            key_path,
            kid,
            issuer,
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied(),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .copied(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_KEY_PATH)
                .long(ARG_ACCESS_TOKEN_KEY_PATH)
                .help("Path to the RS256 private key (PEM or DER) used to sign access tokens")
                .env("BUGBASE_ACCESS_TOKEN_KEY_PATH"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_KID)
                .long(ARG_ACCESS_TOKEN_KID)
                .help("Key id (kid) published in the local JWKS for the signing key")
                .default_value("local")
                .env("BUGBASE_ACCESS_TOKEN_KID"),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Issuer (iss) claim stamped into locally issued access tokens")
                .env("BUGBASE_TOKEN_ISSUER"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds (default: 900)")
                .env("BUGBASE_ACCESS_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token lifetime in seconds (default: 2592000)")
                .env("BUGBASE_REFRESH_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("bugbase"))
    }

    #[test]
    fn parse_requires_key_path() {
        temp_env::with_vars(
            [
                ("BUGBASE_ACCESS_TOKEN_KEY_PATH", None::<&str>),
                ("BUGBASE_TOKEN_ISSUER", Some("https://api.bugbase.test")),
            ],
            || {
                let matches = command().get_matches_from(vec!["bugbase"]);
                let result = Options::parse(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("--access-token-key-path"));
                }
            },
        );
    }

    #[test]
    fn parse_requires_issuer() {
        temp_env::with_vars(
            [
                ("BUGBASE_ACCESS_TOKEN_KEY_PATH", Some("/tmp/key.pem")),
                ("BUGBASE_TOKEN_ISSUER", None::<&str>),
            ],
            || {
                let matches = command().get_matches_from(vec!["bugbase"]);
                let result = Options::parse(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("--token-issuer"));
                }
            },
        );
    }

    #[test]
    fn parse_defaults_kid_and_leaves_ttls_unset() {
        temp_env::with_vars(
            [
                ("BUGBASE_ACCESS_TOKEN_KEY_PATH", None::<&str>),
                ("BUGBASE_ACCESS_TOKEN_KID", None::<&str>),
                ("BUGBASE_TOKEN_ISSUER", None::<&str>),
                ("BUGBASE_ACCESS_TOKEN_TTL_SECONDS", None::<&str>),
                ("BUGBASE_REFRESH_TOKEN_TTL_SECONDS", None::<&str>),
            ],
            || {
                let matches = command().get_matches_from(vec![
                    "bugbase",
                    "--access-token-key-path",
                    "/tmp/key.pem",
                    "--token-issuer",
                    "https://api.bugbase.test",
                ]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert_eq!(options.key_path, "/tmp/key.pem");
                    assert_eq!(options.kid, "local");
                    assert_eq!(options.issuer, "https://api.bugbase.test");
                    assert_eq!(options.access_token_ttl_seconds, None);
                    assert_eq!(options.refresh_token_ttl_seconds, None);
                }
            },
        );
    }

    #[test]
    fn parse_reads_ttl_overrides() {
        temp_env::with_vars(
            [
                ("BUGBASE_ACCESS_TOKEN_TTL_SECONDS", Some("600")),
                ("BUGBASE_REFRESH_TOKEN_TTL_SECONDS", Some("86400")),
            ],
            || {
                let matches = command().get_matches_from(vec![
                    "bugbase",
                    "--access-token-key-path",
                    "/tmp/key.pem",
                    "--token-issuer",
                    "https://api.bugbase.test",
                ]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert_eq!(options.access_token_ttl_seconds, Some(600));
                    assert_eq!(options.refresh_token_ttl_seconds, Some(86400));
                }
            },
        );
    }

    #[test]
    fn ttl_rejects_zero() {
        let result = command().try_get_matches_from(vec![
            "bugbase",
            "--access-token-ttl-seconds",
            "0",
        ]);
        assert!(result.is_err());
    }
}
