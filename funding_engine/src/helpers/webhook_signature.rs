//! HMAC-SHA256 webhook signatures.
//!
//! The gateway signs the raw request body with the shared endpoint secret and sends the hex
//! digest in a signature header. Verification happens before any ledger state is read or locked,
//! so an unauthenticated request can never hold resources.
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::traits::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`. Used by tests and by the hosted-checkout
/// adapter; real gateways compute the same digest on their side.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time verification of a hex signature header against the raw payload.
pub fn verify_payload(payload: &[u8], signature_hex: &str, secret: &str) -> Result<(), SignatureError> {
    let expected = decode_hex(signature_hex).ok_or(SignatureError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureError::InvalidSignature)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok()).collect()
}
