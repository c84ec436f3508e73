use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use sha2::Sha256;

const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;
const ROUNDS: u32 = 100_000;

/// base64(salt || PBKDF2-HMAC-SHA256(password, salt))
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let key = derive(password, &salt);
    let mut stored = Vec::with_capacity(SALT_LEN + KEY_LEN);
    stored.extend_from_slice(&salt);
    stored.extend_from_slice(&key);
    STANDARD.encode(stored)
}

/// Malformed stored hashes simply fail verification.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(stored) else {
        return false;
    };
    if decoded.len() != SALT_LEN + KEY_LEN {
        return false;
    }

    let (salt, expected) = decoded.split_at(SALT_LEN);
    let actual = derive(password, salt);
    constant_time_eq(&actual, expected)
}

fn derive(password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ROUNDS, &mut key);
    key
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_is_salted() {
        let first = hash_password("correct horse");
        let second = hash_password("correct horse");
        assert_ne!(first, second);
        assert!(verify_password("correct horse", &first));
        assert!(!verify_password("wrong horse", &first));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("x", "not base64!"));
        assert!(!verify_password("x", &STANDARD.encode([0u8; 8])));
    }
}
