//! Auth handlers and supporting modules.
//!
//! This module coordinates the authentication surface: local registration
//! and password login, refresh token rotation, logout, and the bridge that
//! accepts externally issued identity tokens.
//!
//! ## Token model
//!
//! - **Access tokens** are short-lived RS256 JWTs signed with the server's
//!   own key; handlers verify them offline against the derived local JWKS.
//! - **Refresh tokens** are opaque random values stored hash-only; each use
//!   rotates the value, and logout revokes every token the user holds.
//! - **External identity tokens** are verified against the provider's JWKS
//!   and mirrored into the user directory on first use.

pub(crate) mod bridge;
pub(crate) mod directory;
pub(crate) mod errors;
pub(crate) mod login;
mod password;
pub(crate) mod principal;
pub(crate) mod refresh;
mod refresh_tokens;
pub(crate) mod register;
pub(crate) mod session;
pub(crate) mod state;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
