use clap::{Arg, ArgMatches, Command};

pub const ARG_IDENTITY_JWKS_URL: &str = "identity-jwks-url";
pub const ARG_IDENTITY_JWKS_PATH: &str = "identity-jwks-path";
pub const ARG_IDENTITY_ISSUER: &str = "identity-issuer";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwks_url: Option<String>,
    pub jwks_path: Option<String>,
    pub issuer: String,
}

impl Options {
    /// Parse external identity provider arguments from matches.
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

        let jwks_url = get_non_empty(ARG_IDENTITY_JWKS_URL);
        let jwks_path = get_non_empty(ARG_IDENTITY_JWKS_PATH);
        if jwks_url.is_none() && jwks_path.is_none() {
            anyhow::bail!(
                "missing required argument: --{ARG_IDENTITY_JWKS_URL} or --{ARG_IDENTITY_JWKS_PATH}"
            );
        }

        let issuer = match get_non_empty(ARG_IDENTITY_ISSUER) {
            Some(value) => value,
            None => anyhow::bail!("missing required argument: --{ARG_IDENTITY_ISSUER}"),
        };

        Ok(Self {
            jwks_url,
            jwks_path,
            issuer,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_JWKS_URL)
                .long(ARG_IDENTITY_JWKS_URL)
                .help("JWKS URL used to verify external identity provider tokens")
                .long_help(
                    "JWKS URL (typically the provider's `/.well-known/jwks.json`) used to verify external\nidentity provider tokens.\n\nThe keyset is cached (TTL ~5 minutes) and refreshed on unknown `kid` with a cooldown. Verification\nitself is local and does not call the provider per request.",
                )
                .env("BUGBASE_IDENTITY_JWKS_URL"),
        )
        .arg(
            Arg::new(ARG_IDENTITY_JWKS_PATH)
                .long(ARG_IDENTITY_JWKS_PATH)
                .help("Path to a static JWKS file (JSON) used instead of a remote JWKS URL")
                .env("BUGBASE_IDENTITY_JWKS_PATH")
                .conflicts_with(ARG_IDENTITY_JWKS_URL),
        )
        .arg(
            Arg::new(ARG_IDENTITY_ISSUER)
                .long(ARG_IDENTITY_ISSUER)
                .help("Expected external identity token issuer (iss)")
                .env("BUGBASE_IDENTITY_ISS"),
        )
}
