use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::model::generate_token;

const ALGORITHM: &str = "pbkdf2_sha256";
pub const DEFAULT_ITERATIONS: u32 = 100_000;
const KEY_LENGTH: usize = 32;

/// Hashes a password as `pbkdf2_sha256$<iterations>$<salt>$<hex key>`.
pub fn hash_password(password: &str) -> String {
    hash_with(password, &generate_token(), DEFAULT_ITERATIONS)
}

fn hash_with(password: &str, salt: &str, iterations: u32) -> String {
    format!(
        "{}${}${}${}",
        ALGORITHM,
        iterations,
        salt,
        hex::encode(derive(password, salt, iterations))
    )
}

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    key
}

/// Checks a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if algorithm != ALGORITHM {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };

    derive(password, salt, iterations)
        .as_slice()
        .ct_eq(expected.as_slice())
        .into()
}

/// Runs [`hash_password`] on the blocking pool so key stretching does not
/// stall the async workers.
pub async fn hash_password_blocking(password: String) -> anyhow::Result<String> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&password)).await?)
}

/// Runs [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(password: String, stored: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await?)
}
