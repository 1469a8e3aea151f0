use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{AppError, Result};

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 2;

/// Hashes a secret (link password or recovery phrase) with Argon2id.
///
/// # Arguments
///
/// * `secret` - The secret to hash.
///
/// # Returns
///
/// A `Result` containing the PHC-formatted hash.
pub fn hash_secret(secret: &str) -> Result<String> {
    let mut secret_bytes = secret.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Encryption(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Encryption(format!("Argon2 params: {}", e)))?,
    );

    let hash = argon2
        .hash_password(&secret_bytes, &salt)
        .map_err(|e| AppError::Encryption(format!("Argon2 hash error: {}", e)))?
        .to_string();

    secret_bytes.zeroize();
    Ok(hash)
}

/// Verifies a secret against an Argon2 PHC hash.
///
/// # Returns
///
/// `Ok(true)` on a match, `Ok(false)` on a mismatch, `Err` only if the stored
/// hash is unreadable.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool> {
    let mut secret_bytes = secret.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Encryption(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&secret_bytes, &parsed_hash)
        .is_ok();

    secret_bytes.zeroize();
    Ok(result)
}

/// Runs [`hash_secret`] on the blocking pool.
pub async fn hash_secret_blocking(secret: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let mut secret = secret;
        let hash = hash_secret(&secret);
        secret.zeroize();
        hash
    })
    .await
    .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

/// Runs [`verify_secret`] on the blocking pool.
pub async fn verify_secret_blocking(secret: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let mut secret = secret;
        let verified = verify_secret(&secret, &hash);
        secret.zeroize();
        verified
    })
    .await
    .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}
