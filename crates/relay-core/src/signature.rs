//! # Signature Verification Module
//!
//! Authenticates inbound webhooks before anything is persisted. Each source
//! has its own shared-secret scheme:
//!
//! | source   | header                 | scheme                      | prefix    |
//! |----------|------------------------|-----------------------------|-----------|
//! | internal | `Authorization`        | shared token equality       | none      |
//! | github   | `X-Hub-Signature-256`  | HMAC-SHA256 over raw body   | `sha256=` |
//! | zammad   | `X-Hub-Signature`      | HMAC-SHA1 over raw body     | `sha1=`   |
//!
//! All comparisons are constant-time: HMAC digests go through
//! [`Mac::verify_slice`], the internal token through [`subtle`]'s `ct_eq`.
//! Verification is a pure check with no side effects; on failure the caller
//! must reject the request without persisting anything.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Header carrying the internal shared token.
pub const INTERNAL_TOKEN_HEADER: &str = "authorization";
/// Header carrying the GitHub HMAC-SHA256 signature.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header carrying the Zammad HMAC-SHA1 signature.
pub const ZAMMAD_SIGNATURE_HEADER: &str = "x-hub-signature";

// ============================================================================
// Errors
// ============================================================================

/// Authentication failure for an inbound webhook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("{header} is missing")]
    MissingHeader { header: String },

    #[error("Signatures don't match")]
    Mismatch,

    #[error("Token doesn't match")]
    TokenMismatch,
}

// ============================================================================
// Shared secrets
// ============================================================================

/// The per-source shared secrets, loaded from configuration at startup.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub internal_token: String,
    pub github_secret: String,
    pub zammad_secret: String,
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecrets")
            .field("internal_token", &"<REDACTED>")
            .field("github_secret", &"<REDACTED>")
            .field("zammad_secret", &"<REDACTED>")
            .finish()
    }
}

// ============================================================================
// Verification functions
// ============================================================================

/// Verify the internal shared-token `Authorization` header.
///
/// The comparison is constant-time even though the token is not a digest.
///
/// # Errors
///
/// [`SignatureError::MissingHeader`] when the header is absent,
/// [`SignatureError::TokenMismatch`] when the token differs.
pub fn verify_internal_token(
    headers: &HashMap<String, String>,
    expected_token: &str,
) -> Result<(), SignatureError> {
    let token = headers
        .get(INTERNAL_TOKEN_HEADER)
        .ok_or_else(|| SignatureError::MissingHeader {
            header: "Authorization".to_string(),
        })?;

    if expected_token.as_bytes().ct_eq(token.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::TokenMismatch)
    }
}

/// Verify that the payload was sent by GitHub.
///
/// Expects `X-Hub-Signature-256: sha256=<hex of HMAC-SHA256(body)>`.
/// Returns the supplied signature string for audit storage.
pub fn verify_github_signature(
    headers: &HashMap<String, String>,
    body: &[u8],
    secret: &str,
) -> Result<String, SignatureError> {
    let signature = headers
        .get(GITHUB_SIGNATURE_HEADER)
        .ok_or_else(|| SignatureError::MissingHeader {
            header: "X-Hub-Signature-256".to_string(),
        })?;

    let digest = decode_prefixed_hex(signature, "sha256=")?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)?;

    Ok(signature.clone())
}

/// Verify that the payload was sent by our Zammad instance.
///
/// Expects `X-Hub-Signature: sha1=<hex of HMAC-SHA1(body)>`. Returns the
/// supplied signature string for audit storage.
pub fn verify_zammad_signature(
    headers: &HashMap<String, String>,
    body: &[u8],
    secret: &str,
) -> Result<String, SignatureError> {
    let signature = headers
        .get(ZAMMAD_SIGNATURE_HEADER)
        .ok_or_else(|| SignatureError::MissingHeader {
            header: "X-Hub-Signature".to_string(),
        })?;

    let digest = decode_prefixed_hex(signature, "sha1=")?;

    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)?;

    Ok(signature.clone())
}

/// Strip the scheme prefix and hex-decode the digest.
///
/// A missing prefix or non-hex payload can never match a computed digest,
/// so both collapse into [`SignatureError::Mismatch`].
fn decode_prefixed_hex(signature: &str, prefix: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_part = signature
        .strip_prefix(prefix)
        .ok_or(SignatureError::Mismatch)?;
    hex::decode(hex_part).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
