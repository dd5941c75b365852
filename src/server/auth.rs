//! Signed URL authentication.
//!
//! Requests are authenticated by an HMAC-SHA256 over the path and the query
//! parameters other than `sig`:
//!
//! ```text
//! signature = HMAC-SHA256(secret_key, "{path}?{canonical_query}")
//! ```
//!
//! The canonical query is every `key=value` pair (including `exp`), form
//! encoded and sorted by key then value. Repeated `filter` parameters are all
//! covered, so a signed feature query cannot be widened or narrowed.
//!
//! ```text
//! /layers/7/features?filter=species%3Aoak&exp=1735689600&sig=abc123...
//! ```
//!
//! # Example
//!
//! ```rust
//! use layer_tiles::server::auth::SignedUrlAuth;
//! use std::time::Duration;
//!
//! let auth = SignedUrlAuth::new("my-secret-key");
//!
//! let path = "/tiles/layer/7/3/1/2.mvt";
//! let (signature, expiry) = auth.sign(path, Duration::from_secs(3600));
//!
//! assert!(auth.verify(path, &signature, expiry, &[]).is_ok());
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature query parameter.
pub const SIGNATURE_PARAM: &str = "sig";

/// Name of the expiry query parameter.
pub const EXPIRY_PARAM: &str = "exp";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing signature parameter")]
    MissingSignature,

    #[error("Missing expiry parameter")]
    MissingExpiry,

    #[error("Signature expired at {expired_at} (current time: {current_time})")]
    Expired { expired_at: u64, current_time: u64 },

    #[error("Invalid signature")]
    InvalidSignature,

    /// Not hex, or `sig` given more than once
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Not an integer, or `exp` given more than once
    #[error("Invalid expiry format")]
    InvalidExpiryFormat,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::MissingSignature => (StatusCode::UNAUTHORIZED, "missing_signature"),
            AuthError::MissingExpiry => (StatusCode::UNAUTHORIZED, "missing_expiry"),
            AuthError::Expired { .. } => (StatusCode::UNAUTHORIZED, "signature_expired"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::InvalidSignatureFormat => {
                (StatusCode::BAD_REQUEST, "invalid_signature_format")
            }
            AuthError::InvalidExpiryFormat => (StatusCode::BAD_REQUEST, "invalid_expiry_format"),
        };
        let message = self.to_string();

        // A bad signature on a well-formed request may be tampering
        if self == AuthError::InvalidSignature {
            warn!(error_type, status = status.as_u16(), "Authentication failed: {}", message);
        } else {
            debug!(error_type, status = status.as_u16(), "Authentication failed: {}", message);
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Signed URL Authentication
// =============================================================================

/// Signs and verifies URLs with a shared secret.
#[derive(Clone)]
pub struct SignedUrlAuth {
    secret_key: Vec<u8>,
}

impl SignedUrlAuth {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Sign `path` for `ttl` from now. Returns the hex signature and expiry.
    pub fn sign(&self, path: &str, ttl: Duration) -> (String, u64) {
        self.sign_with_params(path, ttl, &[])
    }

    /// Sign `path` plus extra query parameters (excluding `exp` and `sig`).
    pub fn sign_with_params(
        &self,
        path: &str,
        ttl: Duration,
        params: &[(&str, &str)],
    ) -> (String, u64) {
        let expiry = now_secs().saturating_add(ttl.as_secs());
        (self.sign_with_expiry(path, expiry, params), expiry)
    }

    /// Sign with an explicit expiry timestamp (Unix seconds).
    pub fn sign_with_expiry(&self, path: &str, expiry: u64, params: &[(&str, &str)]) -> String {
        hex::encode(self.mac(path, expiry, params))
    }

    /// Check `signature` against `path`, `expiry` and `params`.
    ///
    /// Expiry is checked first; the comparison itself is constant-time.
    pub fn verify(
        &self,
        path: &str,
        signature: &str,
        expiry: u64,
        params: &[(&str, &str)],
    ) -> Result<(), AuthError> {
        let current_time = now_secs();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided = hex::decode(signature).map_err(|_| AuthError::InvalidSignatureFormat)?;
        let expected = self.mac(path, expiry, params);

        if bool::from(provided.ct_eq(&expected)) {
            Ok(())
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    /// Full URL with `exp` and `sig` appended after `params`.
    pub fn generate_signed_url(
        &self,
        base_url: &str,
        path: &str,
        ttl: Duration,
        params: &[(&str, &str)],
    ) -> String {
        let (signature, expiry) = self.sign_with_params(path, ttl, params);
        format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            path,
            signed_query(params, expiry, &signature)
        )
    }

    fn mac(&self, path: &str, expiry: u64, params: &[(&str, &str)]) -> Vec<u8> {
        let message = signature_base(path, expiry, params);
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Query string carrying `params`, then `exp` and `sig`.
pub fn signed_query(params: &[(&str, &str)], expiry: u64, signature: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(params.iter());
    serializer.append_pair(EXPIRY_PARAM, &expiry.to_string());
    serializer.append_pair(SIGNATURE_PARAM, signature);
    serializer.finish()
}

fn signature_base(path: &str, expiry: u64, params: &[(&str, &str)]) -> String {
    let expiry = expiry.to_string();
    let mut pairs: Vec<(&str, &str)> = params.to_vec();
    pairs.push((EXPIRY_PARAM, expiry.as_str()));
    pairs.sort();

    let canonical = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{path}?{canonical}")
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Reject requests whose `sig`/`exp` do not match their path and query.
pub async fn auth_middleware(
    State(auth): State<SignedUrlAuth>,
    OriginalUri(original_uri): OriginalUri,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let query = original_uri.query().unwrap_or("");
    let mut signature: Option<String> = None;
    let mut expiry: Option<u64> = None;
    let mut params: Vec<(String, String)> = Vec::new();

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key == SIGNATURE_PARAM {
            if signature.replace(value.into_owned()).is_some() {
                return Err(AuthError::InvalidSignatureFormat);
            }
        } else if key == EXPIRY_PARAM {
            let parsed = value
                .parse::<u64>()
                .map_err(|_| AuthError::InvalidExpiryFormat)?;
            if expiry.replace(parsed).is_some() {
                return Err(AuthError::InvalidExpiryFormat);
            }
        } else {
            params.push((key.into_owned(), value.into_owned()));
        }
    }

    let signature = signature.ok_or(AuthError::MissingSignature)?;
    let expiry = expiry.ok_or(AuthError::MissingExpiry)?;

    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    auth.verify(original_uri.path(), &signature, expiry, &params)?;

    Ok(next.run(request).await)
}
