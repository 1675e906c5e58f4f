//! RS256 token codec used for locally issued access tokens and for
//! externally issued identity tokens verified against a provider JWKS.

mod jwks;
mod jwt;

pub use jwks::{Jwk, Jwks};
pub use jwt::{AccessTokenClaims, Error, TokenHeader, TokenSigner, decode_verified};

#[cfg(test)]
pub(crate) use jwt::tests::{TEST_PRIVATE_KEY_PEM, test_jwks, test_signer};
