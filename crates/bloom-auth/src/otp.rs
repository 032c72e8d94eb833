use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Trim + lowercase. Applied before any hashing or storage lookup so that
/// case and whitespace never create duplicate identities.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fixed-length decimal code, each digit uniformly random.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Keyed digest of `email:code`. Only this digest is ever stored; verification
/// re-derives it from the candidate code and compares.
pub fn hash_code(secret: &str, email: &str, code: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}:{}", normalize_email(email), code).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
