//! Password hashing
//!
//! Salted one-way hashing via bcrypt. Hashing and comparison failures are
//! surfaced as errors, never folded into a `false`.

use crate::error::AuthError;

/// bcrypt work factor used when nothing is configured
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Hash `password` with a fresh random salt
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(AuthError::Hashing)
}

/// Compare `password` against a stored bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(AuthError::Comparison)
}

/// Whether `value` looks like a bcrypt hash ($2a$, $2b$, $2x$, $2y$)
pub fn is_bcrypt_hash(value: &str) -> bool {
    value.len() == 60
        && ["$2a$", "$2b$", "$2x$", "$2y$"]
            .iter()
            .any(|prefix| value.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_and_verify() {
        let password = "test_password_123";
        let hashed = hash_password(password, TEST_COST).unwrap();

        assert!(is_bcrypt_hash(&hashed));
        assert_ne!(hashed, password);
        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("test_password_124", &hashed).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same", TEST_COST).unwrap();
        let b = hash_password("same", TEST_COST).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_cost_is_an_error() {
        assert!(matches!(hash_password("pw", 2), Err(AuthError::Hashing(_))));
    }

    #[test]
    fn test_malformed_hash_is_an_error_not_false() {
        assert!(matches!(
            verify_password("pw", "not-a-bcrypt-hash"),
            Err(AuthError::Comparison(_))
        ));
    }
}
