use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. Wrong passwords and malformed
/// hashes both come back `false`.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = hash_password("mySecurePassword123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("mySecurePassword123", &hash));
    }

    #[test]
    fn wrong_password_fails() {
        let hash = hash_password("mySecurePassword123").unwrap();
        assert!(!verify_password("wrongPassword", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = hash_password("mySecurePassword123").unwrap();
        let second = hash_password("mySecurePassword123").unwrap();
        assert_ne!(first, second);
        assert!(verify_password("mySecurePassword123", &first));
        assert!(verify_password("mySecurePassword123", &second));
    }
}
