use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::jwt::{Error, decode_private_key};

/// A JSON Web Key Set, either fetched from the identity provider or derived
/// locally from the access-token signing key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse a JWKS from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid JSON or doesn't match the
    /// expected JWKS shape.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Find a key by `kid` (Key ID).
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Check that every key in the set is an RSA signing key.
    ///
    /// An empty set passes validation; verification against it fails closed
    /// with an unknown-kid error instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyParse`] if a key has an unexpected type.
    pub fn validate(&self) -> Result<(), Error> {
        for key in &self.keys {
            if key.kty != "RSA" {
                return Err(Error::KeyParse);
            }
        }
        Ok(())
    }

    /// Build a single-key JWKS from an RSA private key (PEM or DER).
    ///
    /// The public half is derived from the private key; used to verify the
    /// server's own access tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_rsa_private_key_pem_or_der(
        private_key_pem_or_der: &[u8],
        kid: impl Into<String>,
    ) -> Result<Self, Error> {
        let private_key = decode_private_key(private_key_pem_or_der)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid)],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub n: String,
    pub e: String,
}

impl Jwk {
    /// Build a JWK from an `RsaPublicKey`.
    #[must_use]
    pub fn from_rsa_public_key(public_key: &RsaPublicKey, kid: impl Into<String>) -> Self {
        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        Self {
            kty: "RSA".to_string(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            n,
            e,
        }
    }

    /// Convert this JWK to an `RsaPublicKey`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base64url values cannot be decoded or the RSA
    /// key is invalid.
    pub fn to_rsa_public_key(&self) -> Result<RsaPublicKey, Error> {
        let n_bytes = Base64UrlUnpadded::decode_vec(&self.n).map_err(|_| Error::Base64)?;
        let e_bytes = Base64UrlUnpadded::decode_vec(&self.e).map_err(|_| Error::Base64)?;
        let n = BigUint::from_bytes_be(&n_bytes);
        let e = BigUint::from_bytes_be(&e_bytes);
        RsaPublicKey::new(n, e).map_err(Error::Rsa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::tests::TEST_PRIVATE_KEY_PEM;

    #[test]
    fn derives_jwks_from_private_key() -> Result<(), Error> {
        let jwks = Jwks::from_rsa_private_key_pem_or_der(TEST_PRIVATE_KEY_PEM.as_bytes(), "local")?;
        assert_eq!(jwks.keys.len(), 1);
        jwks.validate()?;

        let jwk = jwks.find_by_kid("local").ok_or(Error::KeyParse)?;
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg.as_deref(), Some("RS256"));
        let _ = jwk.to_rsa_public_key()?;
        Ok(())
    }

    #[test]
    fn json_round_trip_preserves_keys() -> Result<(), Error> {
        let jwks = Jwks::from_rsa_private_key_pem_or_der(TEST_PRIVATE_KEY_PEM.as_bytes(), "k1")?;
        let json = serde_json::to_string(&jwks)?;
        let parsed = Jwks::from_json(&json)?;
        assert_eq!(parsed, jwks);
        Ok(())
    }

    #[test]
    fn validate_rejects_non_rsa_keys() {
        let jwks = Jwks {
            keys: vec![Jwk {
                kty: "OKP".to_string(),
                alg: None,
                key_use: None,
                kid: "k1".to_string(),
                n: String::new(),
                e: String::new(),
            }],
        };
        assert!(matches!(jwks.validate(), Err(Error::KeyParse)));
    }

    #[test]
    fn find_by_kid_misses_unknown() -> Result<(), Error> {
        let jwks = Jwks::from_rsa_private_key_pem_or_der(TEST_PRIVATE_KEY_PEM.as_bytes(), "k1")?;
        assert!(jwks.find_by_kid("k2").is_none());
        Ok(())
    }
}
