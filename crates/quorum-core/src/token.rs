use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::seq::IndexedRandom;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Mints a high-entropy vote token: 32 random bytes, URL-safe base64.
pub fn generate_vote_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derives the deterministic lookup key for a token: HMAC-SHA256 under
/// the server secret, hex-encoded.
///
/// The store only ever sees this key, so reading the checkins table
/// cannot be used to forge a check-in, while the unique index on the key
/// still gives O(1) lookups instead of row-by-row hash comparison.
pub fn token_lookup_key(secret: &str, token: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Generates a pronounceable code of the given length by alternating
/// consonants and vowels, e.g. `BAKOMEDU`. Used for meeting codes that
/// people read out loud.
pub fn make_pronounceable(length: usize) -> String {
    const CONSONANTS: &[u8] = b"BCDFGHJKLMNPQRSTVWXYZ";
    const VOWELS: &[u8] = b"AEIOU";

    let mut rng = rand::rng();
    let mut code = String::with_capacity(length);
    for i in 0..length {
        let pool = if i % 2 == 1 { VOWELS } else { CONSONANTS };
        // both pools are non-empty
        if let Some(&ch) = pool.choose(&mut rng) {
            code.push(ch as char);
        }
    }
    code
}
