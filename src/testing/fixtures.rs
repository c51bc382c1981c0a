//! Test fixtures providing pre-built test objects

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use crate::session::{EncryptedCookieStore, SessionManager};
use crate::settings::OidcSettings;
use crate::utils::crypto::random_bytes;

use super::constants::{
    TEST_CLIENT_ID, TEST_CLIENT_SECRET, TEST_END_SESSION_ENDPOINT, TEST_SESSION_KEY,
};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Session manager over encrypted cookies, `force_https` off
    ///
    /// # Panics
    ///
    /// Never; the test key is long enough.
    #[must_use]
    pub fn session_manager() -> SessionManager {
        SessionManager::new(TEST_SESSION_KEY, false).expect("test key is 32 bytes")
    }

    /// Cookie store using the same key as [`TestFixtures::session_manager`]
    #[must_use]
    pub fn cookie_store() -> EncryptedCookieStore {
        EncryptedCookieStore::new(TEST_SESSION_KEY)
    }

    /// Unsigned JWT carrying `claims`
    #[must_use]
    pub fn jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    /// Realistic, highly compressible token of exactly `len` bytes
    #[must_use]
    pub fn jwt_like_token(len: usize) -> String {
        let mut token = Self::jwt(&json!({
            "iss": "https://idp.example.com",
            "sub": "user-1",
            "pad": "x".repeat(len),
        }));
        token.truncate(len);
        token
    }

    /// Random URL-safe token of exactly `len` bytes; gzip barely shrinks it
    #[must_use]
    pub fn incompressible_token(len: usize) -> String {
        let mut token = URL_SAFE_NO_PAD.encode(random_bytes(len));
        token.truncate(len);
        token
    }

    /// Settings pointing at `token_endpoint`, with a fixed secret and provider logout
    #[must_use]
    pub fn settings(token_endpoint: &str) -> OidcSettings {
        let mut settings = OidcSettings::default();
        settings.session.session_secret =
            String::from_utf8_lossy(TEST_SESSION_KEY).into_owned();
        settings.provider.client_id = TEST_CLIENT_ID.to_string();
        settings.provider.client_secret = TEST_CLIENT_SECRET.to_string();
        settings.provider.authorization_endpoint = "https://idp.example.com/authorize".to_string();
        settings.provider.token_endpoint = token_endpoint.to_string();
        settings.provider.end_session_endpoint = TEST_END_SESSION_ENDPOINT.to_string();
        settings
    }
}
