use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine as _};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Paste-id alphabet with the ambiguous characters `0/O/1/l/I` removed.
pub const ID_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// URL-safe base64: unpadded on encode, padding tolerated on decode.
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn b64_encode(data: &[u8]) -> String {
    B64.encode(data)
}

pub fn b64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    B64.decode(data)
}

/// Random paste id. The space at the default length of 10 is ~53^10 ≈ 2^57;
/// callers still retry on a unique-constraint conflict.
pub fn new_paste_id(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| *ID_ALPHABET.choose(&mut rng).expect("alphabet is non-empty") as char)
        .collect()
}

/// Mint a 32-byte delete token, returned both base64url-encoded (for the
/// one-shot creation response) and raw (for hashing).
pub fn new_delete_token() -> (String, [u8; 32]) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    (b64_encode(&bytes), bytes)
}

/// SHA-256 over pepper || proof. Both delete schemes reduce to this hash.
pub fn delete_auth_hash(pepper: &[u8], proof: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(pepper);
    hasher.update(proof);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Length check first, then a constant-time byte walk.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}
