//! Argon2 hashing for client secrets and resource-owner passwords

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Hash a secret into a PHC string suitable for storage
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(secret.as_bytes(), &salt)?
        .to_string())
}

/// Verify a candidate against a stored PHC hash.
///
/// Argon2 is deliberately slow, so verification runs on the blocking pool.
pub async fn verify_secret(hash: &str, candidate: &str) -> bool {
    let hash = hash.to_string();
    let candidate = candidate.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed = match PasswordHash::new(&hash) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!("Stored secret hash is unreadable: {}", e);
                return false;
            }
        };
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .unwrap_or(false)
}
