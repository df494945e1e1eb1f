//! # Webhook Credential Verification
//!
//! Inbound webhook authentication for the two storefront platforms: Salla
//! signs the raw body with HMAC-SHA256, Zid presents a shared token. Both
//! checks use constant-time comparison to prevent timing attacks.

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature on Salla deliveries.
pub const SALLA_SIGNATURE_HEADER: &str = "x-salla-signature";

/// Header carrying the shared webhook token on Zid deliveries.
pub const ZID_TOKEN_HEADER: &str = "x-zid-token";

/// Errors that can occur during webhook credential verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required credential header: {header}")]
    MissingCredential { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Webhook verification not configured for platform: {platform}")]
    NotConfigured { platform: String },

    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::MissingCredential { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::InvalidSignatureFormat { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::VerificationFailed => StatusCode::UNAUTHORIZED,
            VerificationError::NotConfigured { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::UnsupportedPlatform { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        let code = match err {
            VerificationError::NotConfigured { .. } => "UNAUTHORIZED",
            VerificationError::UnsupportedPlatform { .. } => "NOT_FOUND",
            _ => "INVALID_SIGNATURE",
        };
        ApiError::new(err.status_code(), code, &err.to_string())
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies a Salla webhook signature: hex HMAC-SHA256 over the raw body.
pub fn verify_salla_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(
        body_size = body.len(),
        "Starting Salla signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingCredential {
            header: SALLA_SIGNATURE_HEADER.to_string(),
        });
    }

    let provided_bytes = hex::decode(signature_header).map_err(|_| {
        VerificationError::InvalidSignatureFormat {
            header: format!("{} contains invalid hex", SALLA_SIGNATURE_HEADER),
        }
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies a Zid webhook token against the configured shared token.
pub fn verify_zid_token(token_header: &str, expected_token: &str) -> VerificationResult<()> {
    if token_header.is_empty() {
        return Err(VerificationError::MissingCredential {
            header: ZID_TOKEN_HEADER.to_string(),
        });
    }

    if subtle::ConstantTimeEq::ct_eq(token_header.as_bytes(), expected_token.as_bytes()).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies the webhook credential for the given platform.
///
/// On success returns the presented credential so callers can fold it into
/// the idempotency event key.
pub fn verify_webhook(
    platform: &str,
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<String> {
    match platform {
        "salla" => {
            let secret = config.webhook_salla_secret.as_ref().ok_or_else(|| {
                VerificationError::NotConfigured {
                    platform: "salla".to_string(),
                }
            })?;

            let signature_header = headers
                .get(SALLA_SIGNATURE_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");

            verify_salla_signature(body, signature_header, secret)?;
            Ok(signature_header.to_string())
        }
        "zid" => {
            let expected_token = config.webhook_zid_token.as_ref().ok_or_else(|| {
                VerificationError::NotConfigured {
                    platform: "zid".to_string(),
                }
            })?;

            let token_header = headers
                .get(ZID_TOKEN_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");

            verify_zid_token(token_header, expected_token)?;
            Ok(token_header.to_string())
        }
        _ => Err(VerificationError::UnsupportedPlatform {
            platform: platform.to_string(),
        }),
    }
}
