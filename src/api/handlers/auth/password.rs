//! Argon2id credential hashing and verification.
//!
//! Accounts provisioned through the External Identity Bridge carry no local
//! secret; their `password_hash` column is NULL and local login is disabled
//! for them.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hash a plaintext password into a salted PHC string.
///
/// # Errors
///
/// Returns an error if hashing fails (parameter or RNG failure).
pub(super) fn hash_password(plaintext: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(plaintext.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored credential.
///
/// `None` is the external-auth sentinel: those accounts never verify, with
/// the same outcome as a wrong password so callers can keep a single generic
/// denial. Argon2 verification itself is constant-time in the digest
/// comparison.
pub(super) fn verify_password(stored: Option<&str>, plaintext: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trip() -> Result<(), argon2::password_hash::Error> {
        let hash = hash_password("pw123456")?;
        assert!(verify_password(Some(&hash), "pw123456"));
        Ok(())
    }

    #[test]
    fn wrong_password_fails() -> Result<(), argon2::password_hash::Error> {
        let hash = hash_password("pw123456")?;
        assert!(!verify_password(Some(&hash), "pw1234567"));
        Ok(())
    }

    #[test]
    fn external_sentinel_never_verifies() {
        assert!(!verify_password(None, "pw123456"));
    }

    #[test]
    fn hashes_are_salted() -> Result<(), argon2::password_hash::Error> {
        let first = hash_password("pw123456")?;
        let second = hash_password("pw123456")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn garbage_stored_hash_fails_closed() {
        assert!(!verify_password(Some("not-a-phc-string"), "pw123456"));
    }
}
