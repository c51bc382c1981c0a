//! PKCE (RFC 7636) and OIDC nonce helpers

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::utils::crypto::random_bytes;

/// The only challenge method this crate emits
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 43-character URL-safe string (32 random bytes, base64url without padding).
#[must_use]
pub fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(32))
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
#[must_use]
pub fn derive_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates the nonce sent in the authorization request and echoed in the ID token.
///
/// 32 random bytes, base64url with padding (44 characters).
#[must_use]
pub fn generate_nonce() -> String {
    URL_SAFE.encode(random_bytes(32))
}

/// Generates the CSRF `state` parameter (64 hex characters)
#[must_use]
pub fn generate_state() -> String {
    crate::utils::crypto::generate_secure_random_hex(32)
}
