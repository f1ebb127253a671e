//! HMAC request-signing primitives shared by the exchange adapters

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

pub fn hmac_sha256_hex(secret: &[u8], payload: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha384_hex(secret: &[u8], payload: &str) -> String {
    let mut mac =
        Hmac::<Sha384>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha512_base64(secret: &[u8], payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}
