use thiserror::Error;

use crate::rpc::BaseRequest;
use crate::sign::{calc_sign, now_millis, sign_matches};

/// Maximum drift, in either direction, between a request timestamp and the
/// server clock.
pub const SIGN_WINDOW_MS: u64 = 3_600_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("server sign key is set, the sign field is required")]
    MissingSignature,
    #[error("server sign key is set, the timestamp field is required")]
    MissingTimestamp,
    #[error("timestamp check failed: drift from server time ({now}) must not exceed 1 hour (diff_time={diff})")]
    ReplayWindowExceeded { now: i64, diff: u64 },
    #[error("signature check failed")]
    SignatureMismatch,
}

/// Checks `request` against the server sign key using the wall clock.
pub fn verify<T>(request: &BaseRequest<T>, server_secret: &str) -> Result<(), AuthError> {
    verify_at(request, server_secret, now_millis())
}

/// Same as [`verify`] with an explicit server time in milliseconds.
///
/// An empty secret disables signing entirely and every request passes.
pub fn verify_at<T>(
    request: &BaseRequest<T>,
    server_secret: &str,
    now_ms: i64,
) -> Result<(), AuthError> {
    if server_secret.is_empty() {
        return Ok(());
    }

    let provided = request
        .sign
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingSignature)?;
    let timestamp = request
        .timestamp
        .filter(|value| *value != 0)
        .ok_or(AuthError::MissingTimestamp)?;

    let diff = now_ms.abs_diff(timestamp);
    if diff > SIGN_WINDOW_MS {
        return Err(AuthError::ReplayWindowExceeded { now: now_ms, diff });
    }

    let expected = calc_sign(&timestamp.to_string(), server_secret);
    if !sign_matches(&expected, provided) {
        return Err(AuthError::SignatureMismatch);
    }
    Ok(())
}

/// Client-side check of a signed reply.
///
/// Replies carry no replay window; only presence and signature are checked,
/// and only when the client sign key is set.
pub fn verify_reply(timestamp: i64, sign: Option<&str>, client_secret: &str) -> Result<(), AuthError> {
    if client_secret.is_empty() {
        return Ok(());
    }
    let provided = sign
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingSignature)?;
    let expected = calc_sign(&timestamp.to_string(), client_secret);
    if !sign_matches(&expected, provided) {
        return Err(AuthError::SignatureMismatch);
    }
    Ok(())
}
