use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..64)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() {
        return Err(AppError::Validation("Please enter your email.".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("Email address is not valid.".to_string()));
    }
    Ok(())
}

/// Checks run before a sign-in attempt reaches the backend.
pub fn validate_sign_in(email: &str, password: &str) -> Result<(), AppError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(AppError::Validation("Please enter your password.".to_string()));
    }
    Ok(())
}

pub fn validate_sign_up(email: &str, password: &str, confirm_password: &str) -> Result<(), AppError> {
    validate_sign_in(email, password)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    if password != confirm_password {
        return Err(AppError::Validation("Passwords do not match.".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(result: Result<(), AppError>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn tokens_are_random_and_alphanumeric() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn sign_in_requires_email_and_password() {
        assert!(rejection(validate_sign_in("  ", "x")).contains("email"));
        assert!(rejection(validate_sign_in("user.example.com", "x")).contains("not valid"));
        assert!(rejection(validate_sign_in("user@example.com", "")).contains("password"));
        assert!(validate_sign_in("user@example.com", "x").is_ok());
    }

    #[test]
    fn sign_up_checks_length_and_confirmation() {
        assert!(rejection(validate_sign_up("user@example.com", "abc", "abc")).contains("at least 6"));
        assert!(rejection(validate_sign_up("user@example.com", "secret1", "secret2")).contains("match"));
        assert!(validate_sign_up("user@example.com", "secret1", "secret1").is_ok());
    }
}
