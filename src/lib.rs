//! # Bugbase (Authentication & Session Backend)
//!
//! `bugbase` is the authentication and session subsystem of a bug tracking
//! backend. It owns the user directory, password credentials, refresh tokens,
//! and short-lived access tokens.
//!
//! ## Token Model
//!
//! - **Access tokens** are RS256-signed JWTs minted locally with a short TTL.
//!   They carry the subject, email, and role, and verify offline against the
//!   JWKS derived from the signing key.
//! - **Refresh tokens** are opaque random values; only their SHA-256 hash is
//!   stored. Each use rotates the token, and expiry is enforced lazily at
//!   lookup time.
//!
//! ## External Identities
//!
//! Tokens minted by a configured external identity provider are accepted as
//! bearer credentials. They verify offline against the provider's JWKS
//! (remote with caching, or a static file), and a matching directory row is
//! provisioned on first use. Locally assigned roles stick across provider
//! logins.
//!
//! ## Authorization
//!
//! Roles are `admin` and `member`; admin implies member. Every denial is a
//! uniform `403 Forbidden` so callers cannot distinguish a missing credential
//! from an insufficient role.

pub mod api;
pub mod cli;
pub mod token;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
