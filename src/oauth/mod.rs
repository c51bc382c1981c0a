//! OAuth2 / OIDC protocol helpers
//!
//! Token endpoint exchange, PKCE, unverified claims extraction, the claims cache
//! and RP-initiated logout URLs.

pub mod cache;
pub mod claims;
pub mod exchange;
pub mod logout;
pub mod pkce;

pub use cache::{spawn_cleanup_task, Cache, TokenCache};
pub use claims::{claim_str, extract_claims, ttl_from_claims, Claims, ClaimsError};
pub use exchange::{ExchangeError, GrantType, TokenExchangeClient, TokenResponse, MAX_REDIRECTS};
pub use logout::{build_logout_url, resolve_post_logout_url};
pub use pkce::{
    derive_code_challenge, generate_code_verifier, generate_nonce, generate_state,
    CODE_CHALLENGE_METHOD,
};
