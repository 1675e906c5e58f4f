//! API handlers and the shared identity-provider verifier.
//!
//! This module organizes the service's route handlers and holds the
//! `IdentityVerifier`, which validates externally issued identity tokens
//! against the provider's JWKS.

pub mod auth;
pub mod health;
pub mod users;

use anyhow::{Context, Result, anyhow};
use reqwest::{
    Client,
    header::{ETAG, IF_NONE_MATCH},
};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};
use tokio::sync::RwLock;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::token::{Error as TokenError, Jwks, decode_verified};

// JWKS caching: in-memory keyset with TTL; refresh on stale cache or unknown
// kid. If refresh fails, keep the last known keyset so verification keeps
// working.
const KEYSET_CACHE_TTL_SECONDS: u64 = 300;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;
const KEYSET_FETCH_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug)]
enum KeysetSource {
    /// Keyset loaded from a local file or CLI string and never refreshed.
    Static,
    /// Keyset fetched from the provider's JWKS URL and refreshed as needed.
    Remote { url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    /// Last known JWKS for identity token verification.
    keyset: Jwks,
    /// When the keyset was last successfully fetched.
    fetched_at: Instant,
    /// `ETag` from the last successful fetch, if the provider sends one.
    etag: Option<String>,
}

impl KeysetCache {
    /// Keyset is fresh if within TTL; stale keysets trigger a refresh attempt.
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DependencyStatus {
    /// Provider is reachable and the JWKS fetch succeeded.
    Ok,
    /// Provider is unreachable or the JWKS fetch failed.
    Error,
    /// Static keyset means no external dependency.
    Static,
}

impl DependencyStatus {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }

    pub(crate) const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// How identity token verification failed, before mapping to the client
/// error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentityVerifyError {
    /// No usable keyset and the provider could not be reached; retryable.
    Unavailable,
    /// The token itself failed verification; fatal for this request.
    Invalid,
}

/// Verifies externally issued identity tokens using a cached JWKS.
///
/// Used by the identity bridge to validate provider tokens offline and by
/// `/health` to report dependency status when the keyset is fetched remotely.
#[derive(Debug)]
pub struct IdentityVerifier {
    /// Where the JWKS comes from (static or remote provider URL).
    keyset_source: KeysetSource,
    /// In-memory cached keyset and last fetch timestamp.
    keyset_cache: RwLock<KeysetCache>,
    /// Expected `iss` claim on identity tokens.
    issuer: String,
    /// Timestamp to throttle refresh attempts on unknown kid.
    last_refresh_unix: AtomicU64,
}

impl IdentityVerifier {
    /// Build from a static keyset (file/inline CLI), no remote refresh.
    #[must_use]
    pub fn new(keyset: Jwks, issuer: String) -> Self {
        Self {
            keyset_source: KeysetSource::Static,
            keyset_cache: RwLock::new(KeysetCache {
                keyset,
                fetched_at: Instant::now(),
                etag: None,
            }),
            issuer,
            last_refresh_unix: AtomicU64::new(0),
        }
    }

    /// Build a verifier that fetches the JWKS from the provider's URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built. A failed startup fetch is not an error: the verifier starts
    /// with an empty, stale cache so verification fails closed until a
    /// refresh succeeds.
    pub async fn new_remote(url: String, issuer: String) -> Result<Self> {
        let parsed = Url::parse(&url).context("Invalid identity JWKS URL")?;
        if parsed.scheme() != "https" {
            return Err(anyhow!("Identity JWKS URL must use https: {url}"));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(KEYSET_FETCH_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build JWKS HTTP client")?;

        let (keyset, fetched_at, last_refresh_unix, etag) =
            match fetch_keyset(&client, &url, None).await {
                Ok(FetchOutcome::Updated { keyset, etag }) => {
                    keyset.validate().context("Invalid identity JWKS")?;
                    (keyset, Instant::now(), now_unix_seconds_u64(), etag)
                }
                Ok(FetchOutcome::NotModified) => {
                    warn!("identity JWKS fetch returned not-modified during startup");
                    (empty_keyset(), stale_instant(), 0, None)
                }
                Err(err) => {
                    warn!(
                        url = %url,
                        error = %err,
                        "identity JWKS fetch failed during startup; continuing with empty keyset"
                    );
                    (empty_keyset(), stale_instant(), 0, None)
                }
            };
        Ok(Self {
            keyset_source: KeysetSource::Remote { url, client },
            keyset_cache: RwLock::new(KeysetCache {
                keyset,
                fetched_at,
                etag,
            }),
            issuer,
            last_refresh_unix: AtomicU64::new(last_refresh_unix),
        })
    }

    /// Return the remote JWKS URL when configured, otherwise `None`.
    pub fn keyset_url(&self) -> Option<&str> {
        match &self.keyset_source {
            KeysetSource::Static => None,
            KeysetSource::Remote { url, .. } => Some(url.as_str()),
        }
    }

    /// Expected issuer of identity tokens.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Return a keyset snapshot; refresh if stale, keep cache if refresh fails.
    async fn keyset_snapshot(&self) -> Jwks {
        let (cached, fresh) = {
            let cache = self.keyset_cache.read().await;
            (cache.keyset.clone(), cache.is_fresh())
        };

        if fresh {
            return cached;
        }

        if let KeysetSource::Remote { url, .. } = &self.keyset_source {
            if let Err(err) = self.refresh_keyset().await {
                // Refresh failure shouldn't break verification; keep using
                // the last cached keyset.
                warn!(
                    error = %err,
                    url = %url,
                    "failed to refresh identity JWKS cache"
                );
                return cached;
            }
        }

        let cache = self.keyset_cache.read().await;
        cache.keyset.clone()
    }

    /// Fetch the JWKS from the provider and update the in-memory cache.
    async fn refresh_keyset(&self) -> Result<()> {
        let (url, client, etag) = match &self.keyset_source {
            KeysetSource::Static => return Ok(()),
            KeysetSource::Remote { url, client } => {
                let etag = self.keyset_cache.read().await.etag.clone();
                (url.clone(), client.clone(), etag)
            }
        };

        match fetch_keyset(&client, &url, etag.as_deref()).await? {
            FetchOutcome::NotModified => {
                let mut cache = self.keyset_cache.write().await;
                cache.fetched_at = Instant::now();
            }
            FetchOutcome::Updated { keyset, etag } => {
                keyset.validate().context("Invalid identity JWKS")?;
                let mut cache = self.keyset_cache.write().await;
                cache.keyset = keyset;
                cache.fetched_at = Instant::now();
                cache.etag = etag;
                info!(
                    keyset_keys = cache.keyset.keys.len(),
                    "identity JWKS cache refreshed"
                );
            }
        }
        Ok(())
    }

    /// Report dependency status for `/health` by attempting a refresh.
    pub(crate) async fn dependency_status(&self) -> DependencyStatus {
        match &self.keyset_source {
            KeysetSource::Static => DependencyStatus::Static,
            KeysetSource::Remote { url, .. } => match self.refresh_keyset().await {
                Ok(()) => DependencyStatus::Ok,
                Err(err) => {
                    warn!(
                        error = %err,
                        url = %url,
                        "identity JWKS fetch failed during health check"
                    );
                    DependencyStatus::Error
                }
            },
        }
    }

    /// Refresh if a token `kid` is unknown, with cooldown to avoid hammering
    /// the provider.
    async fn refresh_on_unknown_kid(&self) -> Result<bool> {
        if matches!(&self.keyset_source, KeysetSource::Static) {
            return Ok(false);
        }
        let now = now_unix_seconds_u64();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            // Avoid a refresh stampede when many unknown-kid tokens arrive.
            return Ok(false);
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        self.refresh_keyset().await?;
        Ok(true)
    }
}

/// Unix seconds for cooldown tracking.
fn now_unix_seconds_u64() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Empty keyset used when the startup fetch fails; forces verification to
/// fail closed.
fn empty_keyset() -> Jwks {
    Jwks { keys: Vec::new() }
}

/// Produce an Instant that is already stale to trigger an early refresh.
fn stale_instant() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(KEYSET_CACHE_TTL_SECONDS + 1))
        .unwrap_or_else(Instant::now)
}

enum FetchOutcome {
    NotModified,
    Updated { keyset: Jwks, etag: Option<String> },
}

/// Fetch the JWKS from the provider and parse its JSON response.
async fn fetch_keyset(client: &Client, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
    let span = info_span!(
        "identity.jwks.fetch",
        http.method = "GET",
        url = %url
    );
    async {
        let mut request = client.get(url);
        if let Some(etag_value) = etag {
            request = request.header(IF_NONE_MATCH, etag_value);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 304 {
            return Ok(FetchOutcome::NotModified);
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow!("identity JWKS fetch failed: {status}"));
        }

        let keyset = Jwks::from_json(&body).context("Invalid identity JWKS JSON")?;
        Ok(FetchOutcome::Updated { keyset, etag })
    }
    .instrument(span)
    .await
}

/// Check an identity token's envelope and signature against the cached
/// keyset and return the raw claims JSON. Claim validation (issuer, expiry,
/// subject shape) is left to the bridge.
///
/// Flow: use the cached keyset; on unknown `kid`, refresh (with cooldown)
/// and retry once. An empty keyset that cannot be refreshed is reported as
/// unavailable rather than invalid, so callers can surface a retryable error.
pub(crate) async fn verify_identity_token(
    verifier: &IdentityVerifier,
    token: &str,
) -> Result<serde_json::Value, IdentityVerifyError> {
    let keyset = verifier.keyset_snapshot().await;

    match decode_verified(token, &keyset) {
        Ok(claims) => Ok(claims),
        Err(TokenError::UnknownKid(kid)) => {
            let refreshed = match verifier.refresh_on_unknown_kid().await {
                Ok(refreshed) => refreshed,
                Err(err) => {
                    warn!(error = %err, "identity JWKS refresh failed");
                    if keyset.keys.is_empty() {
                        return Err(IdentityVerifyError::Unavailable);
                    }
                    false
                }
            };

            if refreshed {
                let keyset = verifier.keyset_snapshot().await;
                if keyset.keys.is_empty() {
                    return Err(IdentityVerifyError::Unavailable);
                }
                return decode_verified(token, &keyset).map_err(|err| {
                    error!("Identity token verification failed after refresh: {err}");
                    IdentityVerifyError::Invalid
                });
            }

            if keyset.keys.is_empty() {
                return Err(IdentityVerifyError::Unavailable);
            }
            warn!(kid = %kid, "identity token kid not found and refresh suppressed");
            Err(IdentityVerifyError::Invalid)
        }
        Err(err) => {
            error!("Identity token verification failed: {err}");
            Err(IdentityVerifyError::Invalid)
        }
    }
}
