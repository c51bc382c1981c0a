//! Testing utilities for the session engine
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (managers, tokens, JWTs, settings)
//! - [`requests`] - HTTP request builder for exercising session loading and handlers
//! - [`mock`] - In-memory cookie backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_session::testing::{RequestBuilder, TestFixtures};
//!
//! let manager = TestFixtures::session_manager();
//! let session = manager.load(&RequestBuilder::new().build()).unwrap();
//! assert!(!session.is_authenticated());
//! ```

pub mod fixtures;
pub mod mock;
pub mod requests;

pub use fixtures::TestFixtures;
pub use mock::MemoryCookieStore;
pub use requests::RequestBuilder;

/// Common test constants
pub mod constants {
    /// Session secret used by test managers (32 bytes)
    pub const TEST_SESSION_KEY: &[u8] = b"test_session_key_32_bytes_long__";

    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";

    pub const TEST_CLIENT_ID: &str = "test-client";
    pub const TEST_CLIENT_SECRET: &str = "test-secret";

    /// Redirect URI registered for the test client
    pub const TEST_REDIRECT_URI: &str = "https://app.example.com/oauth2/callback";

    pub const TEST_END_SESSION_ENDPOINT: &str = "https://idp.example.com/logout";
}
