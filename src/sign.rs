use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the transport signature for `timestamp` under `secret`.
///
/// The signed plaintext is `"{timestamp}\n{secret}"`, keyed by the secret
/// itself. The raw HMAC-SHA256 digest is base64 encoded (standard alphabet,
/// no wrapping) and then percent encoded so it can travel inside JSON or a
/// query string unchanged. Peers running older builds compute exactly this
/// form, so the secret must stay part of the plaintext.
pub fn calc_sign(timestamp: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{timestamp}\n{secret}").as_bytes());
    let digest = mac.finalize().into_bytes();
    urlencoding::encode(&BASE64.encode(digest)).into_owned()
}

/// Byte comparison that does not short-circuit on the first difference.
pub fn sign_matches(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|value| value.as_millis() as i64)
        .unwrap_or(0)
}
