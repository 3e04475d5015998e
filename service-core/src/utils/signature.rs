use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Hex-encoded `HMAC-SHA512(secret, body)`.
///
/// `body` must be the exact bytes received on the wire; re-serialising a
/// parsed payload before signing changes the digest.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex-encoded HMAC-SHA512 signature using constant-time comparison.
///
/// Malformed hex, a wrong length or an empty secret all fail closed.
pub fn verify_payload_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    // ct_eq returns false for unequal lengths without inspecting contents.
    expected.as_slice().ct_eq(provided.as_slice()).into()
}
