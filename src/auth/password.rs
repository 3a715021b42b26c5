//! Salted password digests and session tokens.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

/// PBKDF2 iterations applied to every password.
#[cfg(not(test))]
pub const HASH_ROUNDS: u32 = 600_000;
/// PBKDF2 iterations applied to every password.
#[cfg(test)]
pub const HASH_ROUNDS: u32 = 1_000;

const HASH_BYTES: usize = 32;

const SALT_BYTES: usize = 16;
const TOKEN_BYTES: usize = 32;

/// Fresh random salt, hex-encoded.
#[must_use]
pub fn new_salt() -> String {
    random_hex(SALT_BYTES)
}

/// Fresh opaque session token, hex-encoded.
#[must_use]
pub fn new_session_token() -> String {
    random_hex(TOKEN_BYTES)
}

/// PBKDF2-HMAC-SHA256 of `password` under `salt`, hex-encoded.
#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    derive(password, salt, HASH_ROUNDS)
}

fn derive(password: &str, salt: &str, rounds: u32) -> String {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut out);
    hex::encode(out)
}

/// Check a password against a stored digest.
#[must_use]
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    constant_time_eq(&hash_password(password, salt), expected_hash)
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_per_salt() {
        let salt = new_salt();
        assert_eq!(hash_password("hunter22", &salt), hash_password("hunter22", &salt));
        assert_ne!(hash_password("hunter22", &salt), hash_password("hunter22", &new_salt()));
        assert_eq!(hash_password("x", &salt).len(), 64);
    }

    #[test]
    fn derivation_matches_pbkdf2_hmac_sha256() {
        // First 32 bytes of the RFC 7914 section 11 vector.
        assert_eq!(
            derive("passwd", "salt", 1),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let salt = new_salt();
        let stored = hash_password("correct horse", &salt);
        assert!(verify_password("correct horse", &salt, &stored));
        assert!(!verify_password("correct horsE", &salt, &stored));
        assert!(!verify_password("correct horse", &salt, "abc"));
    }

    #[test]
    fn tokens_are_unique_hex() {
        let a = new_session_token();
        let b = new_session_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn constant_time_eq_compares_lengths() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(constant_time_eq("", ""));
    }
}
