//! HMAC-signed lead links (unsubscribe, follow-up CTAs).
//!
//! Token layout: base64url, unpadded, of `leadId:timestampMs:sig`, where `sig`
//! is the first 16 hex chars of HMAC-SHA256(secret, `leadId:timestampMs`).

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEX_LEN: usize = 16;
pub const TOKEN_MAX_AGE_DAYS: i64 = 7;
/// Tolerated clock skew for timestamps ahead of the verifier.
pub const TOKEN_MAX_SKEW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    BadSignature,
    LeadMismatch,
    Expired,
    NotYetValid,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TokenError::Malformed => "malformed token",
            TokenError::BadSignature => "signature mismatch",
            TokenError::LeadMismatch => "token issued for another lead",
            TokenError::Expired => "token expired",
            TokenError::NotYetValid => "token timestamp is in the future",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::BadRequest(format!("Invalid link token: {}", err))
    }
}

/// Constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn signature(secret: &str, payload: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("HMAC key rejected: {}", e)))?;
    mac.update(payload.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(digest[..SIGNATURE_HEX_LEN].to_string())
}

/// Token for `lead_id` issued at `issued_at`.
pub fn sign_lead_token(
    secret: &str,
    lead_id: &str,
    issued_at: DateTime<Utc>,
) -> Result<String, AppError> {
    let payload = format!("{}:{}", lead_id, issued_at.timestamp_millis());
    let sig = signature(secret, &payload)?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}:{}", payload, sig)))
}

/// Checks signature, lead id and age of a token.
pub fn verify_lead_token(
    secret: &str,
    token: &str,
    lead_id: &str,
    now: DateTime<Utc>,
) -> Result<(), TokenError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| TokenError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| TokenError::Malformed)?;

    let mut parts = decoded.split(':');
    let (Some(token_lead), Some(timestamp), Some(sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    let timestamp_ms: i64 = timestamp.parse().map_err(|_| TokenError::Malformed)?;

    let expected = signature(secret, &format!("{}:{}", token_lead, timestamp_ms))
        .map_err(|_| TokenError::BadSignature)?;
    if !constant_time_compare(sig, &expected) {
        return Err(TokenError::BadSignature);
    }
    if token_lead != lead_id {
        return Err(TokenError::LeadMismatch);
    }

    let issued_at = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or(TokenError::Malformed)?;
    if issued_at > now + Duration::minutes(TOKEN_MAX_SKEW_MINUTES) {
        return Err(TokenError::NotYetValid);
    }
    if now - issued_at > Duration::days(TOKEN_MAX_AGE_DAYS) {
        return Err(TokenError::Expired);
    }

    Ok(())
}

/// `{base}/api/unsubscribe?lead=..&token=..`
pub fn unsubscribe_url(
    public_base_url: &str,
    secret: &str,
    lead_id: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let token = sign_lead_token(secret, lead_id, now)?;
    let mut url = Url::parse(&format!("{}/api/unsubscribe", public_base_url))
        .map_err(|e| AppError::InternalError(format!("Invalid PUBLIC_BASE_URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("lead", lead_id)
        .append_pair("token", &token);
    Ok(url.to_string())
}
