#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the oidc-session crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod oauth;
pub mod session;
pub mod settings;
pub mod utils;

// Fixtures and an in-memory cookie store, for unit tests and downstream test suites
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{health, oauth_callback, oauth_logout, oauth_sign_in};
pub use oauth::{TokenCache, TokenExchangeClient};
pub use session::{SessionData, SessionError, SessionManager};
pub use settings::OidcSettings;
