use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC-SHA256 over `data`, base64-encoded. This is the signature scheme the webhook channel
/// uses.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}
